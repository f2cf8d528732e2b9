//! Connection queue between a hot stream's producer and its consumers
//!
//! A FIFO over a tokio mpsc channel, bounded or unbounded, with a shared
//! receiver so several consumers can pull from it. Closing drops the queue's
//! sender: consumers drain what is buffered and then observe end-of-sequence.
//!
//! The receiver is locked for a single poll at a time, never across a wait,
//! so a consumer that stops polling cannot starve the others. The channel
//! keeps only the waker of the last receiver poll, so waiting consumers are
//! also woken through a [`Notify`] whenever the queue changes or a pending
//! take is abandoned.

use async_stream::stream;
use futures_util::StreamExt;
use serde::Serialize;
use std::fmt;
use std::future::{poll_fn, Future};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{ready, Context, Poll};
use tokio::sync::{mpsc, Notify};

use crate::error::{ensure_positive_size, StreamError, StreamResult};
use crate::seq::Seq;
use crate::stream_configuration::QueueConfig;

/// Error types for Queue operations
#[derive(Debug, Clone, PartialEq)]
pub enum QueueError {
    /// Queue has been closed
    Closed,
    /// Queue is full (for bounded queues)
    Full,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed => write!(f, "Queue is closed"),
            QueueError::Full => write!(f, "Queue is full"),
        }
    }
}

impl std::error::Error for QueueError {}

enum QueueSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        match self {
            QueueSender::Bounded(tx) => QueueSender::Bounded(tx.clone()),
            QueueSender::Unbounded(tx) => QueueSender::Unbounded(tx.clone()),
        }
    }
}

enum QueueReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> QueueReceiver<T> {
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self {
            QueueReceiver::Bounded(rx) => rx.poll_recv(cx),
            QueueReceiver::Unbounded(rx) => rx.poll_recv(cx),
        }
    }

    fn try_recv(&mut self) -> Option<T> {
        match self {
            QueueReceiver::Bounded(rx) => rx.try_recv().ok(),
            QueueReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

/// A reserved place in the queue.
///
/// Waiting for a slot is cancel-safe: abandoning the wait loses nothing, and
/// the element is only handed over once the slot is held.
pub(crate) enum Slot<T> {
    Bounded(mpsc::OwnedPermit<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

/// Internal queue state
struct QueueState<T> {
    sender: Mutex<Option<QueueSender<T>>>,
    capacity: Option<usize>,
    item_count: AtomicUsize,
    failure: Mutex<Option<StreamError>>,
    /// Wakes consumers waiting in `take`
    readable: Notify,
}

/// Re-wakes the other waiting consumers unless the take handed over an item
struct TakeGuard<'a> {
    readable: &'a Notify,
    delivered: bool,
}

impl Drop for TakeGuard<'_> {
    fn drop(&mut self) {
        if !self.delivered {
            self.readable.notify_waiters();
        }
    }
}

/// FIFO buffer decoupling a producer from its consumers
pub struct ConnectionQueue<T> {
    state: Arc<QueueState<T>>,
    receiver: Arc<Mutex<QueueReceiver<T>>>,
}

impl<T> Clone for ConnectionQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<T> ConnectionQueue<T> {
    /// Close the queue, preventing further enqueues but allowing existing items to be consumed
    pub fn close(&self) {
        let sender = match self.state.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);
        self.state.readable.notify_waiters();
    }
}

impl<T> ConnectionQueue<T>
where
    T: Send + 'static,
{
    /// Create a new bounded queue with the given capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; use [`ConnectionQueue::from_config`] to get
    /// an error instead.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self::with_channel(
            QueueSender::Bounded(sender),
            QueueReceiver::Bounded(receiver),
            Some(capacity),
        )
    }

    /// Create a new unbounded queue; `enqueue` never waits
    pub fn unbounded() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self::with_channel(
            QueueSender::Unbounded(sender),
            QueueReceiver::Unbounded(receiver),
            None,
        )
    }

    /// Create a queue as described by `config`
    pub fn from_config(config: &QueueConfig) -> StreamResult<Self> {
        match *config {
            QueueConfig::Bounded { capacity } => {
                ensure_positive_size("queue", "capacity", capacity)?;
                Ok(Self::bounded(capacity))
            }
            QueueConfig::Unbounded => Ok(Self::unbounded()),
        }
    }

    fn with_channel(sender: QueueSender<T>, receiver: QueueReceiver<T>, capacity: Option<usize>) -> Self {
        Self {
            state: Arc::new(QueueState {
                sender: Mutex::new(Some(sender)),
                capacity,
                item_count: AtomicUsize::new(0),
                failure: Mutex::new(None),
                readable: Notify::new(),
            }),
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    fn receiver(&self) -> MutexGuard<'_, QueueReceiver<T>> {
        match self.receiver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn sender(&self) -> Option<QueueSender<T>> {
        match self.state.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Wait for room in the queue
    pub(crate) async fn reserve(&self) -> Result<Slot<T>, QueueError> {
        match self.sender() {
            None => Err(QueueError::Closed),
            Some(QueueSender::Bounded(tx)) => tx
                .reserve_owned()
                .await
                .map(Slot::Bounded)
                .map_err(|_| QueueError::Closed),
            Some(QueueSender::Unbounded(tx)) => Ok(Slot::Unbounded(tx)),
        }
    }

    /// Place `item` into a previously reserved slot
    pub(crate) fn put(&self, slot: Slot<T>, item: T) -> Result<(), QueueError> {
        // count before handing over so a racing take never observes a negative length
        self.state.item_count.fetch_add(1, Ordering::Relaxed);
        let result = match slot {
            Slot::Bounded(permit) => {
                permit.send(item);
                Ok(())
            }
            Slot::Unbounded(tx) => tx.send(item).map_err(|_| {
                self.state.item_count.fetch_sub(1, Ordering::Relaxed);
                QueueError::Closed
            }),
        };
        if result.is_ok() {
            self.state.readable.notify_waiters();
        }
        result
    }

    /// Enqueue an item, waiting while a bounded queue is full
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let slot = self.reserve().await?;
        self.put(slot, item)
    }

    /// Try to enqueue an item without waiting
    pub fn try_enqueue(&self, item: T) -> Result<(), QueueError> {
        let sender = self.sender().ok_or(QueueError::Closed)?;
        self.state.item_count.fetch_add(1, Ordering::Relaxed);
        let result = match sender {
            QueueSender::Bounded(tx) => tx.try_send(item).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }),
            QueueSender::Unbounded(tx) => tx.send(item).map_err(|_| QueueError::Closed),
        };
        match result {
            Ok(()) => self.state.readable.notify_waiters(),
            Err(_) => {
                self.state.item_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Take the next item, waiting while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn take(&self) -> Option<T> {
        let mut guard = TakeGuard {
            readable: &self.state.readable,
            delivered: false,
        };
        loop {
            let notified = self.state.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = poll_fn(|cx| match self.poll_take(cx) {
                Poll::Ready(item) => Poll::Ready(Some(item)),
                Poll::Pending => notified.as_mut().poll(cx).map(|_| None),
            })
            .await;

            match taken {
                Some(Some(item)) => {
                    guard.delivered = true;
                    return Some(item);
                }
                Some(None) => return None,
                None => continue,
            }
        }
    }

    /// Poll the receiver, holding its lock for this poll only
    fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let item = ready!(self.receiver().poll_recv(cx));
        if item.is_some() {
            self.state.item_count.fetch_sub(1, Ordering::Relaxed);
        }
        Poll::Ready(item)
    }

    /// Get a sequence that takes items until the queue is closed and drained
    pub fn dequeue(&self) -> Seq<T> {
        let queue = self.clone();
        stream! {
            while let Some(item) = queue.take().await {
                yield item;
            }
        }
        .boxed()
    }

    /// Record a producer failure and close the queue
    pub fn poison(&self, error: StreamError) {
        match self.state.failure.lock() {
            Ok(mut guard) => *guard = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
        self.close();
    }

    /// The failure recorded by [`ConnectionQueue::poison`], if any
    pub fn failure(&self) -> Option<StreamError> {
        match self.state.failure.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Check if the queue is closed
    pub fn is_closed(&self) -> bool {
        match self.state.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Get the capacity of the queue (None for unbounded)
    pub fn capacity(&self) -> Option<usize> {
        self.state.capacity
    }

    /// Get the current number of buffered items
    pub fn len(&self) -> usize {
        self.state.item_count.load(Ordering::Relaxed)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all currently buffered items without waiting
    pub async fn drain(&self) -> Vec<T> {
        let mut items = Vec::new();
        let mut rx = self.receiver();

        while let Some(item) = rx.try_recv() {
            self.state.item_count.fetch_sub(1, Ordering::Relaxed);
            items.push(item);
        }

        items
    }

    /// Get queue statistics for monitoring
    pub fn stats(&self) -> QueueStats {
        let length = self.len();
        let capacity = self.capacity();
        let utilization = match capacity {
            Some(cap) if cap > 0 => length as f64 / cap as f64,
            _ => 0.0,
        };

        QueueStats {
            length,
            capacity,
            utilization,
            is_closed: self.is_closed(),
        }
    }
}

/// Queue statistics for monitoring and debugging
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub length: usize,
    pub capacity: Option<usize>,
    pub utilization: f64, // 0.0 to 1.0 for bounded queues
    pub is_closed: bool,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.capacity {
            Some(cap) => write!(
                f,
                "Queue({}/{}, {:.1}%{})",
                self.length,
                cap,
                self.utilization * 100.0,
                if self.is_closed { ", closed" } else { "" }
            ),
            None => write!(
                f,
                "Queue({}, unbounded{})",
                self.length,
                if self.is_closed { ", closed" } else { "" }
            ),
        }
    }
}

impl<T> fmt::Debug for ConnectionQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current_len = self.state.item_count.load(Ordering::Relaxed);
        let capacity: &dyn fmt::Debug = match &self.state.capacity {
            Some(cap) => cap,
            None => &"unbounded",
        };
        f.debug_struct("ConnectionQueue")
            .field("capacity", capacity)
            .field("length", &current_len)
            .finish()
    }
}
