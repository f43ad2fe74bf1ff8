//! Asynchronous task layer: bounded retries and sequential queueing.
//!
//! ## Design
//!
//! - [`RetryExecutor`] wraps a single async operation with deterministic
//!   exponential backoff; terminal failures chain the last underlying error
//! - [`TaskQueue`] holds deferred operations (contract transactions, payment
//!   charges) and drains them strictly sequentially with one worker per
//!   instance; a failed entry requeues at the tail up to its attempt budget
//! - Retry windows and idle periods are waited out event-driven (timer
//!   futures and channel wakeups), never by fixed-interval polling
//! - Callers poll terminal results by id; failures are never thrown
//!   asynchronously into unrelated code
//!
//! ## Components
//!
//! - [`RetryPolicy`] / [`BackoffStrategy`]: delay math shared by both
//! - [`RetryExecutor`]: bounded retry around one operation
//! - [`TaskQueue`]: in-process sequential queue with status tracking,
//!   cancellation, per-attempt timeouts, and an optional cache-invalidation
//!   hook on success

pub mod queue;
pub mod retry;
pub mod types;


pub use queue::{QueueConfig, TaskFuture, TaskOperation, TaskQueue};
pub use retry::RetryExecutor;
pub use types::{BackoffStrategy, QueueStats, RetryPolicy, TaskOutcome, TaskStatus};
