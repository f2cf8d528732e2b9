//! Window operators
//!
//! Windows are lazy views over the source: elements are pulled only as the
//! consumer of the current window asks for them. All windows of one outer
//! sequence share a single source cursor, so only the most recently yielded
//! window is live. Advancing the outer sequence closes the previous window;
//! elements it never pulled are not lost and begin the next window.

use async_stream::stream;
use futures_core::Stream;
use futures_util::stream::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::clock::{Clock, TokioClock};
use crate::error::{ensure_positive_duration, ensure_positive_size, StreamResult};
use crate::grouping::GroupLimits;
use crate::seq::Seq;

/// A lazy, non-empty run of consecutive source elements
pub struct Window<O> {
    index: u64,
    inner: Seq<O>,
}

impl<O> Window<O> {
    /// Zero-based position of this window in its outer sequence
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl<O> Stream for Window<O> {
    type Item = O;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<O> std::fmt::Debug for Window<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window").field("index", &self.index).finish()
    }
}

type ClosePredicate<O> = Box<dyn FnMut(&O) -> bool + Send>;

/// Source position shared by the outer sequence and its windows
struct Cursor<O> {
    source: Seq<O>,
    /// Element pulled by a window after its age limit; it opens the next window
    lookahead: Option<O>,
    /// Bumped each time the outer sequence advances; older windows are closed
    generation: u64,
    exhausted: bool,
    closes_after: ClosePredicate<O>,
}

impl<O> Cursor<O> {
    async fn pull(&mut self) -> Option<O> {
        if self.exhausted {
            return None;
        }
        let next = self.source.next().await;
        if next.is_none() {
            self.exhausted = true;
        }
        next
    }
}

fn window_body<O, K>(
    cursor: Arc<Mutex<Cursor<O>>>,
    generation: u64,
    first: O,
    opened_at: Option<Instant>,
    limits: GroupLimits,
    clock: Arc<K>,
) -> Seq<O>
where
    O: Send + 'static,
    K: Clock,
{
    stream! {
        let mut len = 1usize;
        let mut closed = {
            let mut guard = cursor.lock().await;
            (guard.closes_after)(&first) || limits.is_full(len)
        };
        yield first;

        while !closed {
            let mut guard = cursor.lock().await;
            if guard.generation != generation {
                break;
            }
            let Some(item) = guard.pull().await else {
                break;
            };
            if let Some(opened_at) = opened_at {
                if limits.has_expired(opened_at, clock.now()) {
                    guard.lookahead = Some(item);
                    break;
                }
            }
            len += 1;
            closed = (guard.closes_after)(&item) || limits.is_full(len);
            drop(guard);
            yield item;
        }
    }
    .boxed()
}

fn window_with_predicate<O, K>(
    s: Seq<O>,
    limits: GroupLimits,
    clock: K,
    closes_after: ClosePredicate<O>,
) -> Seq<Window<O>>
where
    O: Send + 'static,
    K: Clock,
{
    let clock = Arc::new(clock);
    let cursor = Arc::new(Mutex::new(Cursor {
        source: s,
        lookahead: None,
        generation: 0,
        exhausted: false,
        closes_after,
    }));

    stream! {
        let mut index = 0u64;
        loop {
            let (generation, first) = {
                let mut guard = cursor.lock().await;
                guard.generation += 1;
                let first = match guard.lookahead.take() {
                    Some(item) => Some(item),
                    None => guard.pull().await,
                };
                (guard.generation, first)
            };
            let Some(first) = first else {
                break;
            };
            let opened_at = limits.max_age.map(|_| clock.now());

            let inner = window_body(
                Arc::clone(&cursor),
                generation,
                first,
                opened_at,
                limits,
                Arc::clone(&clock),
            );
            yield Window { index, inner };
            index += 1;
        }
    }
    .boxed()
}

/// Split the source into windows closed on `limits` as measured by `clock`
pub fn window_with<O, K>(s: Seq<O>, limits: GroupLimits, clock: K) -> StreamResult<Seq<Window<O>>>
where
    O: Send + 'static,
    K: Clock,
{
    limits.validate("window")?;
    Ok(window_with_predicate(s, limits, clock, Box::new(|_: &O| false)))
}

/// Windows of `size` consecutive elements; the last may be shorter
///
/// # Examples
/// ```
/// use hotseq::window::window_by_size;
/// use hotseq::seq::from_iter;
/// use futures_util::stream::StreamExt;
///
/// # async fn example() {
/// let windows = window_by_size(from_iter(1..=6), 3)
///     .unwrap()
///     .then(|w| w.collect::<Vec<_>>())
///     .collect::<Vec<_>>()
///     .await;
/// assert_eq!(windows, vec![vec![1, 2, 3], vec![4, 5, 6]]);
/// # }
/// ```
pub fn window_by_size<O>(s: Seq<O>, size: usize) -> StreamResult<Seq<Window<O>>>
where
    O: Send + 'static,
{
    ensure_positive_size("window_by_size", "size", size)?;
    Ok(window_with_predicate(s, GroupLimits::by_size(size), TokioClock, Box::new(|_: &O| false)))
}

/// Windows of elements arriving within `duration` of the window's first element
pub fn window_by_time<O>(s: Seq<O>, duration: Duration) -> StreamResult<Seq<Window<O>>>
where
    O: Send + 'static,
{
    ensure_positive_duration("window_by_time", "duration", duration)?;
    Ok(window_with_predicate(s, GroupLimits::by_time(duration), TokioClock, Box::new(|_: &O| false)))
}

/// Windows closed by size or age, whichever is reached first
pub fn window_by_size_and_time<O>(s: Seq<O>, size: usize, duration: Duration) -> StreamResult<Seq<Window<O>>>
where
    O: Send + 'static,
{
    let limits = GroupLimits::by_size_and_time(size, duration);
    limits.validate("window_by_size_and_time")?;
    Ok(window_with_predicate(s, limits, TokioClock, Box::new(|_: &O| false)))
}

/// Close a window after each element for which `predicate` holds
pub fn window_until<O, P>(s: Seq<O>, predicate: P) -> Seq<Window<O>>
where
    O: Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
{
    window_with_predicate(s, GroupLimits::default(), TokioClock, Box::new(predicate))
}

/// Keep a window open while `predicate` holds; the first element failing it
/// is the window's last
pub fn window_while<O, P>(s: Seq<O>, mut predicate: P) -> Seq<Window<O>>
where
    O: Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
{
    window_with_predicate(s, GroupLimits::default(), TokioClock, Box::new(move |item: &O| !predicate(item)))
}
