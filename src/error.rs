//! Error types for hotseq
//!
//! Grouping and rate-shaping operators report bad parameters synchronously,
//! while hot streams translate failures of their background task into a
//! terminal state that consumers observe on their next pull.

use std::any::Any;
use std::time::Duration;

use crate::queue::QueueError;

/// Main error type for hotseq operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// The upstream sequence failed (returned an error or panicked) while
    /// producing an element
    #[error("source failure: {0}")]
    SourceFailure(String),
    /// A blocking wait was interrupted by an explicit stop request
    #[error("operation cancelled")]
    Cancelled,
    /// Operator or hot stream parameters are invalid
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A connection queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl StreamError {
    /// Build a `SourceFailure` from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "source panicked".to_string()
        };
        StreamError::SourceFailure(message)
    }
}

/// Result type for hotseq operations
pub type StreamResult<T> = Result<T, StreamError>;

pub(crate) fn ensure_positive_size(operator: &str, name: &str, value: usize) -> StreamResult<()> {
    if value == 0 {
        return Err(StreamError::InvalidConfiguration(format!(
            "{}: {} must be greater than 0",
            operator, name
        )));
    }
    Ok(())
}

pub(crate) fn ensure_positive_duration(
    operator: &str,
    name: &str,
    value: Duration,
) -> StreamResult<()> {
    if value.is_zero() {
        return Err(StreamError::InvalidConfiguration(format!(
            "{}: {} must be greater than zero",
            operator, name
        )));
    }
    Ok(())
}
