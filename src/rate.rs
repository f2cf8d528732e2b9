//! Rate-shaping operators
//!
//! These change when elements are emitted, never their values or order.
//! Only [`debounce`] drops elements. Every wait happens inside the returned
//! sequence, so dropping it (for example when a hot stream is stopped)
//! abandons the wait without emitting anything.

use async_stream::stream;
use futures_util::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

use crate::clock::{Clock, TokioClock};
use crate::error::{ensure_positive_duration, ensure_positive_size, StreamResult};
use crate::seq::Seq;

/// Wait `delay` after each element before pulling the next
///
/// N elements take at least `(N - 1) * delay`.
pub fn fixed_delay<O>(s: Seq<O>, delay: Duration) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
{
    fixed_delay_with_clock(s, delay, TokioClock)
}

pub fn fixed_delay_with_clock<O, K>(s: Seq<O>, delay: Duration, clock: K) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
    K: Clock,
{
    ensure_positive_duration("fixed_delay", "delay", delay)?;
    Ok(stream! {
        let mut s = s;
        while let Some(item) = s.next().await {
            yield item;
            clock.sleep(delay).await;
        }
    }
    .boxed())
}

/// Wait a uniformly random duration in `[0, max)` after each element
pub fn jitter<O>(s: Seq<O>, max: Duration) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
{
    jitter_with_clock(s, max, TokioClock, StdRng::from_entropy())
}

/// Like [`jitter`], drawing delays from `rng`
pub fn jitter_with_clock<O, K, R>(s: Seq<O>, max: Duration, clock: K, rng: R) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
    K: Clock,
    R: Rng + Send + 'static,
{
    ensure_positive_duration("jitter", "max", max)?;
    let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    Ok(stream! {
        let mut s = s;
        let mut rng = rng;
        while let Some(item) = s.next().await {
            yield item;
            let pause = Duration::from_nanos(rng.gen_range(0..max_nanos));
            clock.sleep(pause).await;
        }
    }
    .boxed())
}

/// Emit at most one element per `interval`; faster elements wait for their slot
pub fn one_per<O>(s: Seq<O>, interval: Duration) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
{
    one_per_with_clock(s, interval, TokioClock)
}

pub fn one_per_with_clock<O, K>(s: Seq<O>, interval: Duration, clock: K) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
    K: Clock,
{
    ensure_positive_duration("one_per", "interval", interval)?;
    Ok(stream! {
        let mut s = s;
        let mut last_emit: Option<Instant> = None;
        while let Some(item) = s.next().await {
            if let Some(last) = last_emit {
                clock.sleep_until(last + interval).await;
            }
            last_emit = Some(clock.now());
            yield item;
        }
    }
    .boxed())
}

/// Emit up to `count` elements per `interval`, then wait for the interval boundary
///
/// Intervals are anchored at the first emission after the previous interval
/// ended. Nothing is dropped.
pub fn x_per<O>(s: Seq<O>, count: usize, interval: Duration) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
{
    x_per_with_clock(s, count, interval, TokioClock)
}

pub fn x_per_with_clock<O, K>(s: Seq<O>, count: usize, interval: Duration, clock: K) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
    K: Clock,
{
    ensure_positive_size("x_per", "count", count)?;
    ensure_positive_duration("x_per", "interval", interval)?;
    Ok(stream! {
        let mut s = s;
        let mut window_start: Option<Instant> = None;
        let mut emitted = 0usize;
        while let Some(item) = s.next().await {
            let now = clock.now();
            match window_start {
                Some(start) if now.saturating_duration_since(start) < interval => {
                    if emitted >= count {
                        let boundary = start + interval;
                        clock.sleep_until(boundary).await;
                        window_start = Some(boundary);
                        emitted = 0;
                    }
                }
                _ => {
                    window_start = Some(now);
                    emitted = 0;
                }
            }
            emitted += 1;
            yield item;
        }
    }
    .boxed())
}

/// Keep only the latest element of each burst
///
/// The first arrival after an emission opens a window of length `window`.
/// Later arrivals replace the pending element without extending it, and the
/// latest one is emitted when the window closes, so emissions are at least
/// `window` apart even on a source that never goes quiet. The pending element
/// is also emitted when the source ends.
pub fn debounce<O>(s: Seq<O>, window: Duration) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
{
    debounce_with_clock(s, window, TokioClock)
}

pub fn debounce_with_clock<O, K>(s: Seq<O>, window: Duration, clock: K) -> StreamResult<Seq<O>>
where
    O: Send + 'static,
    K: Clock,
{
    ensure_positive_duration("debounce", "window", window)?;
    Ok(stream! {
        let mut s = s;
        let mut pending: Option<O> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            match deadline {
                None => match s.next().await {
                    Some(item) => {
                        pending = Some(item);
                        deadline = Some(clock.now() + window);
                    }
                    None => break,
                },
                Some(at) => {
                    tokio::select! {
                        biased;
                        next = s.next() => match next {
                            Some(item) => pending = Some(item),
                            None => break,
                        },
                        _ = clock.sleep_until(at) => {
                            deadline = None;
                            if let Some(item) = pending.take() {
                                yield item;
                            }
                        }
                    }
                }
            }
        }

        if let Some(item) = pending.take() {
            yield item;
        }
    }
    .boxed())
}
