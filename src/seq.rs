//! Lazy sequences
//!
//! A [`Seq`] is a boxed, pull-based stream: nothing is produced until a
//! consumer polls it. Every operator in this crate consumes and produces
//! `Seq`s, so pipelines compose without ever materializing the source.

use async_stream::stream;
use futures_util::{
    future,
    stream::{self, BoxStream, StreamExt},
};
use std::future::Future;

/// A boxed, heap-allocated lazy sequence with a single forward cursor
pub type Seq<O> = BoxStream<'static, O>;

/// Emit a single element as a sequence
pub fn emit<O>(item: O) -> Seq<O>
where
    O: Send + 'static,
{
    stream::once(future::ready(item)).boxed()
}

/// Create an empty sequence that completes immediately
pub fn empty<O>() -> Seq<O>
where
    O: Send + 'static,
{
    stream::empty().boxed()
}

/// Create a sequence from an iterator
pub fn from_iter<I, O>(iter: I) -> Seq<O>
where
    I: IntoIterator<Item = O> + Send + 'static,
    <I as IntoIterator>::IntoIter: Send,
    O: Send + 'static,
{
    stream::iter(iter).boxed()
}

/// Repeat a value indefinitely
pub fn repeat<O>(item: O) -> Seq<O>
where
    O: Clone + Send + 'static,
{
    stream::repeat(item).boxed()
}

/// Infinite sequence `seed, f(seed), f(f(seed)), ...`
///
/// # Examples
/// ```
/// use hotseq::seq::iterate;
/// use futures_util::stream::StreamExt;
///
/// # async fn example() {
/// let powers = iterate(1u64, |n| n * 2).take(5).collect::<Vec<_>>().await;
/// assert_eq!(powers, vec![1, 2, 4, 8, 16]);
/// # }
/// ```
pub fn iterate<O, F>(seed: O, mut f: F) -> Seq<O>
where
    O: Send + 'static,
    F: FnMut(&O) -> O + Send + 'static,
{
    stream! {
        let mut current = seed;
        loop {
            let next = f(&current);
            yield std::mem::replace(&mut current, next);
        }
    }
    .boxed()
}

/// Generate a sequence from a seed value and an async step function
///
/// The sequence ends when the function returns `None`.
///
/// # Examples
/// ```
/// use hotseq::seq::unfold;
/// use futures_util::stream::StreamExt;
///
/// # async fn example() {
/// let fibonacci = unfold((0, 1), |(a, b)| async move { Some((a, (b, a + b))) });
/// let result = fibonacci.take(10).collect::<Vec<_>>().await;
/// assert_eq!(result, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
/// # }
/// ```
pub fn unfold<S, O, F, Fut>(init: S, mut f: F) -> Seq<O>
where
    S: Send + 'static,
    O: Send + 'static,
    F: FnMut(S) -> Fut + Send + 'static,
    Fut: Future<Output = Option<(O, S)>> + Send + 'static,
{
    stream! {
        let mut state = init;
        loop {
            match f(state).await {
                Some((item, next_state)) => {
                    yield item;
                    state = next_state;
                }
                None => break,
            }
        }
    }
    .boxed()
}
