//! Task statuses, retry policies, and queue observability types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task execution status, as observed through [`TaskQueue::status_of`].
///
/// [`TaskQueue::status_of`]: crate::queue::TaskQueue::status_of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for its turn (or waiting out a retry delay).
    Pending,
    /// The worker is currently executing an attempt.
    Processing,
    /// Finished successfully.
    Completed,
    /// Exhausted its attempt budget (or was cancelled).
    Failed,
    /// The queue has never seen this id.
    NotFound,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Backoff strategy between attempts of the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: `base * 2^(attempt-1)`, capped at `max_delay`.
    #[default]
    Exponential,
}

/// Retry policy configuration.
///
/// Delays are deterministic; no jitter is applied, so two runs against the
/// same failure pattern observe identical timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = a single attempt, no retry).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to computed delays.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Exponential backoff with a cap.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay to wait out before the next attempt, given how many attempts
    /// have already been made (1-indexed: pass 1 after the first failure).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exponent = (attempt - 1).min(31);
                let delay = self.base_delay.saturating_mul(1u32 << exponent);
                delay.min(self.max_delay)
            }
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Terminal result of a queued task, retained after the entry leaves the
/// queue so callers can poll it by id.
#[derive(Debug, Clone)]
pub struct TaskOutcome<T> {
    /// Attempts consumed before reaching a terminal state.
    pub attempts: u32,
    /// When the task was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the task reached its terminal state.
    pub finished_at: DateTime<Utc>,
    /// The operation's value, or the last error rendered as a message.
    pub result: Result<T, String>,
}

/// Queue runtime counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Failed attempts that were requeued for another try.
    pub retries: u64,
}
