use futures::future::BoxFuture;
use futures_core::Stream;
use futures_util::future::FutureExt;
use futures_util::stream::StreamExt;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::error::{StreamError, StreamResult};
use crate::grouping;
use crate::hot_stream::{HotStream, PausableHotStream};
use crate::rate;
use crate::seq::Seq;
use crate::stream_configuration::HotStreamConfig;
use crate::window::{self, Window};

/// The runtime the caller is running on
fn ambient_executor() -> StreamResult<Handle> {
    Handle::try_current().map_err(|e| {
        StreamError::InvalidConfiguration(format!("no tokio runtime to run the hot stream on: {}", e))
    })
}

/// Extension trait exposing the grouping, rate-shaping and hot stream
/// operators as methods on any stream
pub trait SeqExt: Stream + Sized + Send + 'static {
    /// Box this stream into a [`Seq`]
    fn into_seq(self) -> Seq<Self::Item>
    where
        Self::Item: Send + 'static,
    {
        self.boxed()
    }

    /// Group elements into `Vec`s of `size`; see [`grouping::batch_by_size`]
    fn batch_by_size(self, size: usize) -> StreamResult<Seq<Vec<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        grouping::batch_by_size(self.boxed(), size)
    }

    fn batch_by_size_into<C, F>(self, size: usize, factory: F) -> StreamResult<Seq<C>>
    where
        Self::Item: Send + 'static,
        C: Extend<Self::Item> + Send + 'static,
        F: FnMut() -> C + Send + 'static,
    {
        grouping::batch_by_size_into(self.boxed(), size, factory)
    }

    fn batch_by_time(self, duration: Duration) -> StreamResult<Seq<Vec<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        grouping::batch_by_time(self.boxed(), duration)
    }

    fn batch_by_time_into<C, F>(self, duration: Duration, factory: F) -> StreamResult<Seq<C>>
    where
        Self::Item: Send + 'static,
        C: Extend<Self::Item> + Send + 'static,
        F: FnMut() -> C + Send + 'static,
    {
        grouping::batch_by_time_into(self.boxed(), duration, factory)
    }

    /// Group by size or age, whichever limit is reached first
    fn batch_by_size_and_time(self, size: usize, duration: Duration) -> StreamResult<Seq<Vec<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        grouping::batch_by_size_and_time(self.boxed(), size, duration)
    }

    fn batch_by_size_and_time_into<C, F>(self, size: usize, duration: Duration, factory: F) -> StreamResult<Seq<C>>
    where
        Self::Item: Send + 'static,
        C: Extend<Self::Item> + Send + 'static,
        F: FnMut() -> C + Send + 'static,
    {
        grouping::batch_by_size_and_time_into(self.boxed(), size, duration, factory)
    }

    fn batch_until<P>(self, predicate: P) -> Seq<Vec<Self::Item>>
    where
        Self::Item: Send + 'static,
        P: FnMut(&Self::Item) -> bool + Send + 'static,
    {
        grouping::batch_until(self.boxed(), predicate)
    }

    fn batch_while<P>(self, predicate: P) -> Seq<Vec<Self::Item>>
    where
        Self::Item: Send + 'static,
        P: FnMut(&Self::Item) -> bool + Send + 'static,
    {
        grouping::batch_while(self.boxed(), predicate)
    }

    /// Lazy windows of `size` elements; see [`window::window_by_size`]
    fn window_by_size(self, size: usize) -> StreamResult<Seq<Window<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        window::window_by_size(self.boxed(), size)
    }

    fn window_by_time(self, duration: Duration) -> StreamResult<Seq<Window<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        window::window_by_time(self.boxed(), duration)
    }

    fn window_by_size_and_time(self, size: usize, duration: Duration) -> StreamResult<Seq<Window<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        window::window_by_size_and_time(self.boxed(), size, duration)
    }

    fn window_until<P>(self, predicate: P) -> Seq<Window<Self::Item>>
    where
        Self::Item: Send + 'static,
        P: FnMut(&Self::Item) -> bool + Send + 'static,
    {
        window::window_until(self.boxed(), predicate)
    }

    fn window_while<P>(self, predicate: P) -> Seq<Window<Self::Item>>
    where
        Self::Item: Send + 'static,
        P: FnMut(&Self::Item) -> bool + Send + 'static,
    {
        window::window_while(self.boxed(), predicate)
    }

    fn fixed_delay(self, delay: Duration) -> StreamResult<Seq<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        rate::fixed_delay(self.boxed(), delay)
    }

    fn jitter(self, max: Duration) -> StreamResult<Seq<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        rate::jitter(self.boxed(), max)
    }

    fn one_per(self, interval: Duration) -> StreamResult<Seq<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        rate::one_per(self.boxed(), interval)
    }

    fn x_per(self, count: usize, interval: Duration) -> StreamResult<Seq<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        rate::x_per(self.boxed(), count, interval)
    }

    fn debounce(self, window: Duration) -> StreamResult<Seq<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        rate::debounce(self.boxed(), window)
    }

    /// Start draining this stream on the current runtime with the default
    /// configuration
    ///
    /// Fails with [`StreamError::InvalidConfiguration`] outside a runtime.
    fn hot_stream(self) -> StreamResult<HotStream<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        let executor = ambient_executor()?;
        HotStream::start(self, HotStreamConfig::default(), &executor)
    }

    fn hot_stream_with(self, config: HotStreamConfig, executor: &Handle) -> StreamResult<HotStream<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        HotStream::start(self, config, executor)
    }

    /// Like [`SeqExt::hot_stream`], resolving once the first element is queued
    fn primed_hot_stream(self) -> BoxFuture<'static, StreamResult<HotStream<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        async move {
            let executor = ambient_executor()?;
            HotStream::start_primed(self, HotStreamConfig::default(), &executor).await
        }
        .boxed()
    }

    fn primed_hot_stream_with(
        self,
        config: HotStreamConfig,
        executor: Handle,
    ) -> BoxFuture<'static, StreamResult<HotStream<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        async move { HotStream::start_primed(self, config, &executor).await }.boxed()
    }

    fn pausable_hot_stream(self) -> StreamResult<PausableHotStream<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        let executor = ambient_executor()?;
        PausableHotStream::start(self, HotStreamConfig::default(), &executor)
    }

    fn pausable_hot_stream_with(
        self,
        config: HotStreamConfig,
        executor: &Handle,
    ) -> StreamResult<PausableHotStream<Self::Item>>
    where
        Self::Item: Send + 'static,
    {
        PausableHotStream::start(self, config, executor)
    }

    fn primed_pausable_hot_stream(self) -> BoxFuture<'static, StreamResult<PausableHotStream<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        async move {
            let executor = ambient_executor()?;
            PausableHotStream::start_primed(self, HotStreamConfig::default(), &executor).await
        }
        .boxed()
    }

    fn primed_pausable_hot_stream_with(
        self,
        config: HotStreamConfig,
        executor: Handle,
    ) -> BoxFuture<'static, StreamResult<PausableHotStream<Self::Item>>>
    where
        Self::Item: Send + 'static,
    {
        async move { PausableHotStream::start_primed(self, config, &executor).await }.boxed()
    }
}

impl<S> SeqExt for S where S: Stream + Sized + Send + 'static {}
