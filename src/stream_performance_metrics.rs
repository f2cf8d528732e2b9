//! Production metrics for hot streams
//!
//! Counters are updated by the background task with atomics and read by any
//! thread holding the handle; [`ProductionMetrics`] is a point-in-time copy.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::hot_stream::RunState;
use crate::queue::QueueStats;

/// Live counters shared between the production task and its handles
#[derive(Debug)]
pub(crate) struct ProductionCounters {
    items_pulled: AtomicU64,
    items_enqueued: AtomicU64,
    pauses: AtomicU64,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ProductionCounters {
    pub(crate) fn new() -> Self {
        Self {
            items_pulled: AtomicU64::new(0),
            items_enqueued: AtomicU64::new(0),
            pauses: AtomicU64::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub(crate) fn record_pulled(&self) {
        self.items_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.items_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pause(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn items_enqueued(&self) -> u64 {
        self.items_enqueued.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, id: Uuid, run_state: RunState, queue: QueueStats) -> ProductionMetrics {
        ProductionMetrics {
            id,
            items_pulled: self.items_pulled.load(Ordering::Relaxed),
            items_enqueued: self.items_enqueued.load(Ordering::Relaxed),
            pauses: self.pauses.load(Ordering::Relaxed),
            run_state,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            queue,
        }
    }
}

/// Metrics snapshot of one hot stream
#[derive(Debug, Clone, Serialize)]
pub struct ProductionMetrics {
    /// Id of the hot stream the snapshot was taken from
    pub id: Uuid,
    pub items_pulled: u64,
    pub items_enqueued: u64,
    pub pauses: u64,
    pub run_state: RunState,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub queue: QueueStats,
}

impl ProductionMetrics {
    pub fn throughput_items_per_sec(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.items_enqueued as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}
