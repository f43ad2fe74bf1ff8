//! Error taxonomy shared across the task layer.

use std::time::Duration;

use thiserror::Error;

use crate::id::TaskId;

/// Result type used across the task layer.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors that cross the task-layer boundary.
///
/// Transient failures are retried locally and stay invisible to callers;
/// only the terminal variants below ever surface. Cache misses are not an
/// error and are represented as an absent value.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A single attempt of an operation failed. Internal: retried per policy.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// All attempts were consumed. Terminal, carries the last underlying cause.
    #[error("{context} failed after {attempts} attempts")]
    RetryExhausted {
        context: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Status/outcome query for an unknown task id.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The task was cancelled before its next attempt.
    #[error("task cancelled: {0}")]
    Cancelled(TaskId),

    /// A single attempt exceeded the wall-clock budget.
    #[error("{context} timed out after {elapsed:?}")]
    TimedOut { context: String, elapsed: Duration },
}

impl TaskError {
    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }

    pub fn retry_exhausted(
        context: impl Into<String>,
        attempts: u32,
        source: anyhow::Error,
    ) -> Self {
        Self::RetryExhausted {
            context: context.into(),
            attempts,
            source,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::OperationFailed(_))
    }
}
