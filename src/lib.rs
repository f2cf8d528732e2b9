//! Lazy sequence operators and hot streams on tokio
//!
//! Grouping ([`grouping`], [`window`]) and rate shaping ([`rate`]) transform
//! lazy sequences without forcing them. A [`HotStream`] drains a sequence
//! into a [`ConnectionQueue`] on a background task so production runs ahead
//! of consumption; a [`PausableHotStream`] can suspend that production.

pub mod clock;
pub mod error;
pub mod grouping;
pub mod hot_stream;
pub mod queue;
pub mod rate;
pub mod seq;
pub mod seq_ext;
pub mod stream_configuration;
pub mod stream_performance_metrics;
pub mod window;

pub use clock::{Clock, TokioClock};
pub use error::{StreamError, StreamResult};
pub use grouping::GroupLimits;
pub use hot_stream::{HotStream, PausableHotStream, RunState};
pub use queue::{ConnectionQueue, QueueError, QueueStats};
pub use seq::Seq;
pub use seq_ext::SeqExt;
pub use stream_configuration::{HotStreamConfig, QueueConfig};
pub use stream_performance_metrics::ProductionMetrics;
pub use window::Window;
