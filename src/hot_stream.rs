//! Hot streams
//!
//! A hot stream drains a lazy sequence into a [`ConnectionQueue`] on a
//! background task, whether or not anything is consuming yet. Consumers get
//! an ordinary lazy sequence back from [`HotStream::connect`].
//!
//! The production task suspends at checkpoints: before each pull, while a
//! pull is in flight, and while waiting for queue space. At a checkpoint it
//! honours pause and stop requests. An element that has been pulled but not
//! yet queued is held across a pause and queued after resuming.
//!
//! A paused stream stays parked until it is unpaused or stopped. Dropping the
//! last handle stops production just as [`HotStream::stop`] does, paused or
//! not; connected views keep draining what was already queued.

use async_stream::stream;
use futures::FutureExt;
use futures_core::Stream;
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{ControlFlow, Deref};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::error::{StreamError, StreamResult};
use crate::queue::ConnectionQueue;
use crate::seq::Seq;
use crate::stream_configuration::HotStreamConfig;
use crate::stream_performance_metrics::{ProductionCounters, ProductionMetrics};

/// Lifecycle of a hot stream's production task
///
/// Transitions follow `Running ⇄ Paused → Stopped`; a paused stream passes
/// through `Running` on its way to `Stopped`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Paused => write!(f, "paused"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Control {
    /// Requested state
    state: RunState,
    /// The task is suspended at a checkpoint because of a pause
    parked: bool,
    /// The task has exited and the queue is closed
    finished: bool,
    /// Production ended because of a stop request
    cancelled: bool,
}

struct Shared<T> {
    id: Uuid,
    name: String,
    queue: ConnectionQueue<T>,
    control: watch::Sender<Control>,
    counters: ProductionCounters,
}

enum Outcome {
    Exhausted,
    Stopped,
    Failed(StreamError),
}

/// Shared by the handles of one stream but not by its task or views, so
/// that production stops once every handle is gone
struct Owner<T>(Arc<Shared<T>>);

impl<T> Deref for Owner<T> {
    type Target = Shared<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Drop for Owner<T> {
    fn drop(&mut self) {
        if transition_to_stopped(&self.control) {
            log::info!("hot stream {} ({}) dropped, stopping", self.name, self.id);
        }
        self.queue.close();
    }
}

/// Handle to one active production task
///
/// Clones share the task; production stops when the last clone is dropped.
pub struct HotStream<T> {
    shared: Arc<Owner<T>>,
}

impl<T> Clone for HotStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for HotStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.control.borrow().state;
        f.debug_struct("HotStream")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &state)
            .field("queue", &self.shared.queue)
            .finish()
    }
}

fn fallible<T, E, S>(source: S) -> Seq<StreamResult<T>>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    E: fmt::Display,
    T: Send + 'static,
{
    source
        .map(|item| item.map_err(|e| StreamError::SourceFailure(e.to_string())))
        .boxed()
}

impl<T> HotStream<T>
where
    T: Send + 'static,
{
    /// Start draining `source` into a new queue on `executor`
    ///
    /// The configuration is validated before anything is spawned.
    pub fn start<S>(source: S, config: HotStreamConfig, executor: &Handle) -> StreamResult<Self>
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::launch(source.map(Ok).boxed(), config, executor, None)
    }

    /// Like [`HotStream::start`], returning once the first element has been
    /// queued (or the source has finished without producing one)
    pub async fn start_primed<S>(source: S, config: HotStreamConfig, executor: &Handle) -> StreamResult<Self>
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let (primed_tx, primed_rx) = oneshot::channel();
        let hot = Self::launch(source.map(Ok).boxed(), config, executor, Some(primed_tx))?;
        let _ = primed_rx.await;
        Ok(hot)
    }

    /// Start a hot stream over a fallible source; the first `Err` ends
    /// production and is reported to consumers as a source failure
    pub fn try_start<S, E>(source: S, config: HotStreamConfig, executor: &Handle) -> StreamResult<Self>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self::launch(fallible(source), config, executor, None)
    }

    pub async fn try_start_primed<S, E>(
        source: S,
        config: HotStreamConfig,
        executor: &Handle,
    ) -> StreamResult<Self>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        let (primed_tx, primed_rx) = oneshot::channel();
        let hot = Self::launch(fallible(source), config, executor, Some(primed_tx))?;
        let _ = primed_rx.await;
        Ok(hot)
    }

    fn launch(
        source: Seq<StreamResult<T>>,
        config: HotStreamConfig,
        executor: &Handle,
        primed: Option<oneshot::Sender<()>>,
    ) -> StreamResult<Self> {
        config.validate()?;
        let queue = ConnectionQueue::from_config(&config.queue)?;
        let (control, _) = watch::channel(Control {
            state: RunState::Running,
            parked: false,
            finished: false,
            cancelled: false,
        });
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            name: config.name,
            queue,
            control,
            counters: ProductionCounters::new(),
        });

        log::info!(
            "hot stream {} ({}) starting with {:?} queue",
            shared.name,
            shared.id,
            config.queue
        );
        executor.spawn(produce(Arc::clone(&shared), source, primed));

        Ok(Self {
            shared: Arc::new(Owner(shared)),
        })
    }

    /// Unique id of this production task
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn run_state(&self) -> RunState {
        self.shared.control.borrow().state
    }

    /// Whether the production task has exited
    pub fn is_finished(&self) -> bool {
        self.shared.control.borrow().finished
    }

    /// A lazy view over the queue
    ///
    /// Elements arrive in source order. Several connected views share the
    /// queue, so each element is seen by exactly one of them. The view ends
    /// once production has finished and the queue is drained; a production
    /// failure ends it too and is available from [`HotStream::failure`].
    pub fn connect(&self) -> Seq<T> {
        self.shared.queue.dequeue()
    }

    /// Like [`HotStream::connect`], ending with `Err` if production failed
    pub fn try_connect(&self) -> Seq<StreamResult<T>> {
        let queue = self.shared.queue.clone();
        stream! {
            while let Some(item) = queue.take().await {
                yield Ok(item);
            }
            if let Some(error) = queue.failure() {
                yield Err(error);
            }
        }
        .boxed()
    }

    /// The failure that ended production, if any
    pub fn failure(&self) -> Option<StreamError> {
        self.shared.queue.failure()
    }

    /// Stop production
    ///
    /// Buffered elements stay available; consumers waiting on an empty queue
    /// observe end-of-sequence.
    pub fn stop(&self) {
        if transition_to_stopped(&self.shared.control) {
            log::info!("hot stream {} ({}) stop requested", self.shared.name, self.shared.id);
        }
        self.shared.queue.close();
    }

    /// Wait for the production task to exit and report how it ended
    ///
    /// `Ok` once the source is exhausted, [`StreamError::Cancelled`] after a
    /// stop request, or the failure that ended production.
    pub async fn join(&self) -> StreamResult<()> {
        let mut control = self.shared.control.subscribe();
        let cancelled = control
            .wait_for(|c| c.finished)
            .await
            .map(|c| c.cancelled)
            .unwrap_or(false);
        match self.failure() {
            Some(error) => Err(error),
            None if cancelled => Err(StreamError::Cancelled),
            None => Ok(()),
        }
    }

    pub fn metrics(&self) -> ProductionMetrics {
        self.shared
            .counters
            .snapshot(self.shared.id, self.run_state(), self.shared.queue.stats())
    }
}

/// A hot stream whose production can be suspended and resumed
pub struct PausableHotStream<T> {
    inner: HotStream<T>,
}

impl<T> Clone for PausableHotStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for PausableHotStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PausableHotStream").field(&self.inner).finish()
    }
}

impl<T> Deref for PausableHotStream<T> {
    type Target = HotStream<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> PausableHotStream<T>
where
    T: Send + 'static,
{
    pub fn start<S>(source: S, config: HotStreamConfig, executor: &Handle) -> StreamResult<Self>
    where
        S: Stream<Item = T> + Send + 'static,
    {
        HotStream::start(source, config, executor).map(|inner| Self { inner })
    }

    pub async fn start_primed<S>(source: S, config: HotStreamConfig, executor: &Handle) -> StreamResult<Self>
    where
        S: Stream<Item = T> + Send + 'static,
    {
        HotStream::start_primed(source, config, executor)
            .await
            .map(|inner| Self { inner })
    }

    pub fn try_start<S, E>(source: S, config: HotStreamConfig, executor: &Handle) -> StreamResult<Self>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        HotStream::try_start(source, config, executor).map(|inner| Self { inner })
    }

    pub async fn try_start_primed<S, E>(
        source: S,
        config: HotStreamConfig,
        executor: &Handle,
    ) -> StreamResult<Self>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        HotStream::try_start_primed(source, config, executor)
            .await
            .map(|inner| Self { inner })
    }

    /// Suspend production.
    ///
    /// Returns once the task is parked at a checkpoint or has finished, so no
    /// element is pulled from the source after this returns and before
    /// [`PausableHotStream::unpause`]. Already queued elements stay available.
    /// Pausing a paused or stopped stream changes nothing.
    pub async fn pause(&self) {
        let shared = &self.inner.shared;
        let requested = shared.control.send_if_modified(|c| {
            if c.state == RunState::Running {
                c.state = RunState::Paused;
                true
            } else {
                false
            }
        });
        if requested {
            log::debug!("hot stream {} ({}) pause requested", shared.name, shared.id);
        }

        let mut control = shared.control.subscribe();
        let _ = control
            .wait_for(|c| c.state != RunState::Paused || c.parked || c.finished)
            .await
            .map(|_| ());
    }

    /// Resume a paused stream; a running or stopped stream is left alone
    pub fn unpause(&self) {
        let shared = &self.inner.shared;
        let resumed = shared.control.send_if_modified(|c| {
            if c.state == RunState::Paused {
                c.state = RunState::Running;
                true
            } else {
                false
            }
        });
        if resumed {
            log::debug!("hot stream {} ({}) resumed", shared.name, shared.id);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.run_state() == RunState::Paused
    }
}

/// Move to `Stopped`, passing through `Running` when paused.
/// Returns false if the stream was already stopped.
fn transition_to_stopped(control: &watch::Sender<Control>) -> bool {
    control.send_if_modified(|c| {
        if c.state == RunState::Paused {
            c.state = RunState::Running;
            true
        } else {
            false
        }
    });
    control.send_if_modified(|c| {
        if c.state == RunState::Stopped {
            false
        } else {
            c.state = RunState::Stopped;
            true
        }
    })
}

/// Resolves once anything other than `Running` is requested
async fn interrupted(control: &mut watch::Receiver<Control>) {
    let _ = control
        .wait_for(|c| c.state != RunState::Running)
        .await
        .map(|_| ());
}

/// Honour pause and stop requests; `Break` means production must end
async fn checkpoint<T>(shared: &Shared<T>, control: &mut watch::Receiver<Control>) -> ControlFlow<()> {
    loop {
        let mut observed = RunState::Running;
        let changed = shared.control.send_if_modified(|c| {
            observed = c.state;
            match c.state {
                RunState::Paused if !c.parked => {
                    c.parked = true;
                    true
                }
                RunState::Running if c.parked => {
                    c.parked = false;
                    true
                }
                _ => false,
            }
        });

        match observed {
            RunState::Running => return ControlFlow::Continue(()),
            RunState::Stopped => return ControlFlow::Break(()),
            RunState::Paused => {
                if changed {
                    shared.counters.record_pause();
                    log::debug!("hot stream {} ({}) parked", shared.name, shared.id);
                }
                let resumed = control
                    .wait_for(|c| c.state != RunState::Paused)
                    .await
                    .map(|_| ());
                if resumed.is_err() {
                    return ControlFlow::Break(());
                }
            }
        }
    }
}

async fn produce<T>(
    shared: Arc<Shared<T>>,
    mut source: Seq<StreamResult<T>>,
    mut primed: Option<oneshot::Sender<()>>,
) where
    T: Send + 'static,
{
    let mut control = shared.control.subscribe();

    let outcome = 'production: loop {
        if checkpoint(&shared, &mut control).await.is_break() {
            break Outcome::Stopped;
        }

        let pulled = tokio::select! {
            biased;
            _ = interrupted(&mut control) => None,
            next = AssertUnwindSafe(source.next()).catch_unwind() => Some(next),
        };
        let item = match pulled {
            None => continue,
            Some(Ok(Some(Ok(item)))) => item,
            Some(Ok(Some(Err(error)))) => break Outcome::Failed(error),
            Some(Ok(None)) => break Outcome::Exhausted,
            Some(Err(payload)) => break Outcome::Failed(StreamError::from_panic(payload)),
        };
        shared.counters.record_pulled();

        loop {
            if checkpoint(&shared, &mut control).await.is_break() {
                break 'production Outcome::Stopped;
            }

            let reserved = tokio::select! {
                biased;
                _ = interrupted(&mut control) => None,
                slot = shared.queue.reserve() => Some(slot),
            };
            match reserved {
                None => continue,
                Some(Ok(slot)) => {
                    if shared.queue.put(slot, item).is_err() {
                        break 'production Outcome::Stopped;
                    }
                    break;
                }
                Some(Err(_)) => break 'production Outcome::Stopped,
            }
        }
        shared.counters.record_enqueued();

        if let Some(primed) = primed.take() {
            let _ = primed.send(());
        }
    };

    finish(&shared, outcome);
}

fn finish<T>(shared: &Shared<T>, outcome: Outcome)
where
    T: Send + 'static,
{
    let cancelled = matches!(outcome, Outcome::Stopped);
    match outcome {
        Outcome::Exhausted => {
            log::debug!(
                "hot stream {} ({}) exhausted after {} elements",
                shared.name,
                shared.id,
                shared.counters.items_enqueued()
            );
            shared.queue.close();
        }
        Outcome::Stopped => {
            log::info!("hot stream {} ({}) stopped", shared.name, shared.id);
            shared.queue.close();
        }
        Outcome::Failed(error) => {
            log::error!("hot stream {} ({}) failed: {}", shared.name, shared.id, error);
            shared.queue.poison(error);
        }
    }
    transition_to_stopped(&shared.control);
    shared.control.send_modify(|c| {
        c.finished = true;
        c.cancelled = cancelled;
    });
}
