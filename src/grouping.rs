//! Batch operators
//!
//! Each operator re-emits its source as materialized groups. A group is
//! opened by its first element and closed by whichever limit triggers first:
//! size is checked after an element is appended, age is checked lazily when
//! the next element arrives. An element arriving after the group's age limit
//! starts the next group. Groups are never empty and a partial group is
//! emitted when the source ends.

use async_stream::stream;
use futures_util::stream::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

use crate::clock::{Clock, TokioClock};
use crate::error::{ensure_positive_duration, ensure_positive_size, StreamResult};
use crate::seq::Seq;

/// Size and age limits of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupLimits {
    /// Close after this many elements have been appended
    pub max_size: Option<usize>,
    /// Close when an element arrives more than this long after the group opened
    pub max_age: Option<Duration>,
}

impl GroupLimits {
    pub fn by_size(size: usize) -> Self {
        Self {
            max_size: Some(size),
            max_age: None,
        }
    }

    pub fn by_time(duration: Duration) -> Self {
        Self {
            max_size: None,
            max_age: Some(duration),
        }
    }

    pub fn by_size_and_time(size: usize, duration: Duration) -> Self {
        Self {
            max_size: Some(size),
            max_age: Some(duration),
        }
    }

    /// Reject zero sizes and durations
    pub fn validate(&self, operator: &str) -> StreamResult<()> {
        if let Some(size) = self.max_size {
            ensure_positive_size(operator, "size", size)?;
        }
        if let Some(age) = self.max_age {
            ensure_positive_duration(operator, "duration", age)?;
        }
        Ok(())
    }

    pub(crate) fn is_full(&self, len: usize) -> bool {
        self.max_size.map_or(false, |max| len >= max)
    }

    pub(crate) fn has_expired(&self, opened_at: Instant, now: Instant) -> bool {
        self.max_age
            .map_or(false, |age| now.saturating_duration_since(opened_at) > age)
    }
}

struct OpenGroup<C> {
    items: C,
    len: usize,
    opened_at: Option<Instant>,
}

fn group_with<O, C, K, F, P>(
    s: Seq<O>,
    limits: GroupLimits,
    clock: K,
    mut factory: F,
    mut closes_after: P,
) -> Seq<C>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    K: Clock,
    F: FnMut() -> C + Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
{
    stream! {
        let mut s = s;
        let mut open: Option<OpenGroup<C>> = None;

        while let Some(item) = s.next().await {
            let now = limits.max_age.map(|_| clock.now());
            let expired = match (open.as_ref().and_then(|g| g.opened_at), now) {
                (Some(opened_at), Some(now)) => limits.has_expired(opened_at, now),
                _ => false,
            };
            if expired {
                if let Some(group) = open.take() {
                    yield group.items;
                }
            }

            let group = open.get_or_insert_with(|| OpenGroup {
                items: factory(),
                len: 0,
                opened_at: now,
            });
            let close = closes_after(&item);
            group.items.extend(std::iter::once(item));
            group.len += 1;

            if close || limits.is_full(group.len) {
                if let Some(group) = open.take() {
                    yield group.items;
                }
            }
        }

        if let Some(group) = open.take() {
            yield group.items;
        }
    }
    .boxed()
}

/// Group elements into containers built by `factory`, closing each group on
/// `limits` as measured by `clock`
///
/// With no limits set the whole source becomes a single group.
pub fn batch_with<O, C, K, F>(s: Seq<O>, limits: GroupLimits, clock: K, factory: F) -> StreamResult<Seq<C>>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    K: Clock,
    F: FnMut() -> C + Send + 'static,
{
    limits.validate("batch")?;
    Ok(group_with(s, limits, clock, factory, |_| false))
}

/// Group elements into `Vec`s of `size` elements; the last may be shorter
///
/// # Examples
/// ```
/// use hotseq::grouping::batch_by_size;
/// use hotseq::seq::from_iter;
/// use futures_util::stream::StreamExt;
///
/// # async fn example() {
/// let batches = batch_by_size(from_iter(1..=6), 3).unwrap().collect::<Vec<_>>().await;
/// assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6]]);
/// # }
/// ```
pub fn batch_by_size<O>(s: Seq<O>, size: usize) -> StreamResult<Seq<Vec<O>>>
where
    O: Send + 'static,
{
    batch_by_size_into(s, size, move || Vec::with_capacity(size))
}

/// Like [`batch_by_size`], collecting into containers built by `factory`
///
/// The size limit counts appended elements, not the container's length, so a
/// set factory still closes after `size` appends.
pub fn batch_by_size_into<O, C, F>(s: Seq<O>, size: usize, factory: F) -> StreamResult<Seq<C>>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    F: FnMut() -> C + Send + 'static,
{
    ensure_positive_size("batch_by_size", "size", size)?;
    Ok(group_with(s, GroupLimits::by_size(size), TokioClock, factory, |_| false))
}

/// Group elements that arrive within `duration` of their group's first element
pub fn batch_by_time<O>(s: Seq<O>, duration: Duration) -> StreamResult<Seq<Vec<O>>>
where
    O: Send + 'static,
{
    batch_by_time_into(s, duration, Vec::new)
}

pub fn batch_by_time_into<O, C, F>(s: Seq<O>, duration: Duration, factory: F) -> StreamResult<Seq<C>>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    F: FnMut() -> C + Send + 'static,
{
    ensure_positive_duration("batch_by_time", "duration", duration)?;
    Ok(group_with(s, GroupLimits::by_time(duration), TokioClock, factory, |_| false))
}

/// Group elements by size or age, whichever limit is reached first
pub fn batch_by_size_and_time<O>(s: Seq<O>, size: usize, duration: Duration) -> StreamResult<Seq<Vec<O>>>
where
    O: Send + 'static,
{
    batch_by_size_and_time_into(s, size, duration, Vec::new)
}

pub fn batch_by_size_and_time_into<O, C, F>(
    s: Seq<O>,
    size: usize,
    duration: Duration,
    factory: F,
) -> StreamResult<Seq<C>>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    F: FnMut() -> C + Send + 'static,
{
    let limits = GroupLimits::by_size_and_time(size, duration);
    limits.validate("batch_by_size_and_time")?;
    Ok(group_with(s, limits, TokioClock, factory, |_| false))
}

/// Close a group after each element for which `predicate` holds
///
/// # Examples
/// ```
/// use hotseq::grouping::batch_until;
/// use hotseq::seq::from_iter;
/// use futures_util::stream::StreamExt;
///
/// # async fn example() {
/// let batches = batch_until(from_iter(1..=6), |i| i % 3 == 0).collect::<Vec<_>>().await;
/// assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6]]);
/// # }
/// ```
pub fn batch_until<O, P>(s: Seq<O>, predicate: P) -> Seq<Vec<O>>
where
    O: Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
{
    batch_until_into(s, predicate, Vec::new)
}

pub fn batch_until_into<O, C, P, F>(s: Seq<O>, predicate: P, factory: F) -> Seq<C>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
    F: FnMut() -> C + Send + 'static,
{
    group_with(s, GroupLimits::default(), TokioClock, factory, predicate)
}

/// Keep a group open while `predicate` holds; the first element failing it
/// is the group's last
pub fn batch_while<O, P>(s: Seq<O>, predicate: P) -> Seq<Vec<O>>
where
    O: Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
{
    batch_while_into(s, predicate, Vec::new)
}

pub fn batch_while_into<O, C, P, F>(s: Seq<O>, mut predicate: P, factory: F) -> Seq<C>
where
    O: Send + 'static,
    C: Extend<O> + Send + 'static,
    P: FnMut(&O) -> bool + Send + 'static,
    F: FnMut() -> C + Send + 'static,
{
    group_with(s, GroupLimits::default(), TokioClock, factory, move |item| !predicate(item))
}
