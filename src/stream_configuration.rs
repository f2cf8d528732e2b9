//! Configuration types for hot streams

use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive_size, StreamError, StreamResult};

/// Default capacity of a hot stream's connection queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Which connection queue a hot stream produces into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueConfig {
    /// Producer waits when `capacity` elements are buffered
    Bounded { capacity: usize },
    /// Producer never waits; memory grows with the backlog
    Unbounded,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::Bounded {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> StreamResult<()> {
        match *self {
            QueueConfig::Bounded { capacity } => ensure_positive_size("queue", "capacity", capacity),
            QueueConfig::Unbounded => Ok(()),
        }
    }
}

/// Configuration for a hot stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotStreamConfig {
    /// Name used in log lines and metrics
    pub name: String,
    /// Queue the background task produces into
    pub queue: QueueConfig,
}

impl Default for HotStreamConfig {
    fn default() -> Self {
        Self {
            name: "hot-stream".to_string(),
            queue: QueueConfig::default(),
        }
    }
}

impl HotStreamConfig {
    /// Create a new hot stream configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name used in logs and metrics
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the queue configuration
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Produce into a bounded queue of `capacity` elements
    pub fn bounded(self, capacity: usize) -> Self {
        self.queue(QueueConfig::Bounded { capacity })
    }

    /// Produce into an unbounded queue
    pub fn unbounded(self) -> Self {
        self.queue(QueueConfig::Unbounded)
    }

    /// Validate the configuration
    pub fn validate(&self) -> StreamResult<()> {
        if self.name.trim().is_empty() {
            return Err(StreamError::InvalidConfiguration(
                "hot stream: name must not be empty".to_string(),
            ));
        }
        self.queue.validate()
    }
}
