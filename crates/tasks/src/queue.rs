//! Sequential task queue with bounded retries and tail requeueing.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use agrochain_core::{Invalidate, TaskError, TaskId};

use crate::types::{QueueStats, RetryPolicy, TaskOutcome, TaskStatus};

/// Future produced by one invocation of a queued operation.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

/// A deferred unit of work. Must be re-invokable: the worker calls it once
/// per attempt.
pub type TaskOperation<T> = Box<dyn Fn() -> TaskFuture<T> + Send + Sync>;

/// Queue configuration. One policy per queue instance: a transaction queue
/// typically keeps the default fixed 5s delay, a payment queue swaps in
/// `RetryPolicy::exponential(3, 5s, 60s)`.
pub struct QueueConfig {
    /// Name used in log output.
    pub name: String,
    /// Retry delay policy and default attempt budget.
    pub retry_policy: RetryPolicy,
    /// Wall-clock budget per attempt; a hung operation counts as a failed
    /// attempt instead of blocking the queue forever. `None` disables it.
    pub op_timeout: Option<Duration>,
    /// Invalidated after every successfully completed operation
    /// ("write invalidates reads", coarse-grained).
    pub invalidate: Option<Arc<dyn Invalidate>>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "task-queue".to_string(),
            retry_policy: RetryPolicy::fixed(3, Duration::from_secs(5)),
            op_timeout: Some(Duration::from_secs(30)),
            invalidate: None,
        }
    }
}

impl QueueConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_op_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn with_invalidate(mut self, target: Arc<dyn Invalidate>) -> Self {
        self.invalidate = Some(target);
        self
    }
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("name", &self.name)
            .field("retry_policy", &self.retry_policy)
            .field("op_timeout", &self.op_timeout)
            .field("invalidate", &self.invalidate.is_some())
            .finish()
    }
}

/// An entry owned by the worker while it lives in the queue.
struct QueueEntry<T> {
    id: TaskId,
    operation: TaskOperation<T>,
    attempts: u32,
    max_attempts: u32,
    last_attempt_at: Option<Instant>,
}

/// Caller-visible record, kept in the shared map even after the entry
/// leaves the queue so terminal statuses stay pollable.
struct TaskRecord<T> {
    status: TaskStatus,
    cancelled: bool,
    attempts: u32,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    result: Option<Result<T, String>>,
}

impl<T> TaskRecord<T> {
    fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            cancelled: false,
            attempts: 0,
            submitted_at: Utc::now(),
            finished_at: None,
            result: None,
        }
    }
}

struct QueueState<T> {
    records: HashMap<TaskId, TaskRecord<T>>,
    stats: QueueStats,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            stats: QueueStats::default(),
        }
    }
}

type SharedState<T> = Arc<Mutex<QueueState<T>>>;

enum Command<T> {
    Submit(QueueEntry<T>),
    Shutdown,
}

/// In-process sequential task queue.
///
/// One worker task drains entries strictly in arrival order; a failed entry
/// is moved to the tail for its retry so younger entries get a turn first.
/// Terminal failures surface only through [`status_of`](Self::status_of) and
/// [`outcome_of`](Self::outcome_of); nothing is thrown into unrelated code.
///
/// Instances are independent: a transaction queue and a payment queue may
/// progress concurrently, but each is internally serial. The queue's state
/// lives behind a channel feeding the single consumer, which preserves the
/// sequential-processing invariant without locking around the deque itself.
pub struct TaskQueue<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    state: SharedState<T>,
    name: String,
    default_max_attempts: u32,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + 'static> TaskQueue<T> {
    /// Construct the queue and spawn its worker on the current runtime.
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state: SharedState<T> = Arc::new(Mutex::new(QueueState::default()));
        let name = config.name.clone();
        let default_max_attempts = config.retry_policy.max_attempts.max(1);
        let worker = tokio::spawn(worker_loop(config, rx, state.clone()));
        Self {
            tx,
            state,
            name,
            default_max_attempts,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit an operation with the queue's default attempt budget
    /// (the configured policy's `max_attempts`).
    pub fn submit<F, Fut>(&self, operation: F) -> TaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit_with_attempts(operation, self.default_max_attempts)
    }

    /// Submit an operation with an explicit attempt ceiling.
    ///
    /// Returns immediately with the task id; completion is observed by
    /// polling [`status_of`](Self::status_of) / [`outcome_of`](Self::outcome_of).
    pub fn submit_with_attempts<F, Fut>(&self, operation: F, max_attempts: u32) -> TaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = TaskId::new();
        {
            let mut state = self.state.lock().unwrap();
            state.records.insert(id, TaskRecord::new());
            state.stats.submitted += 1;
        }

        let entry = QueueEntry {
            id,
            operation: Box::new(move || Box::pin(operation()) as TaskFuture<T>),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            last_attempt_at: None,
        };

        debug!(queue = %self.name, task_id = %id, max_attempts, "task submitted");

        if self.tx.send(Command::Submit(entry)).is_err() {
            // Worker already shut down; fail the record rather than losing it.
            warn!(queue = %self.name, task_id = %id, "submit after shutdown");
            let mut state = self.state.lock().unwrap();
            finish(&mut state, id, 0, Err("queue is shut down".to_string()));
        }

        id
    }

    /// Status of a task, `NotFound` for ids this queue never issued.
    pub fn status_of(&self, id: TaskId) -> TaskStatus {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&id)
            .map_or(TaskStatus::NotFound, |r| r.status)
    }

    /// Terminal result of a task, `None` while it is still in flight or for
    /// unknown ids.
    pub fn outcome_of(&self, id: TaskId) -> Option<TaskOutcome<T>> {
        let state = self.state.lock().unwrap();
        let record = state.records.get(&id)?;
        let finished_at = record.finished_at?;
        let result = record.result.clone()?;
        Some(TaskOutcome {
            attempts: record.attempts,
            submitted_at: record.submitted_at,
            finished_at,
            result,
        })
    }

    /// Request cancellation of a non-terminal task.
    ///
    /// The flag is honored the next time the worker reaches the entry: it is
    /// marked failed without invoking the operation. An attempt already in
    /// flight is not interrupted; if it succeeds, completion wins. Returns
    /// false for unknown or already-terminal ids.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.records.get_mut(&id) {
            Some(record) if !record.status.is_terminal() => {
                record.cancelled = true;
                debug!(queue = %self.name, task_id = %id, "cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> QueueStats {
        self.state.lock().unwrap().stats.clone()
    }

    /// Stop the worker after the in-flight entry, leaving the rest pending.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn worker_loop<T: Clone + Send + 'static>(
    config: QueueConfig,
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    state: SharedState<T>,
) {
    info!(queue = %config.name, "task queue worker started");
    let mut queue: VecDeque<QueueEntry<T>> = VecDeque::new();

    'worker: loop {
        // Drain control messages that arrived while an entry was running.
        loop {
            match rx.try_recv() {
                Ok(Command::Submit(entry)) => queue.push_back(entry),
                Ok(Command::Shutdown) => break 'worker,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'worker,
            }
        }

        // Idle until woken by a submission; no polling while empty.
        if queue.is_empty() {
            match rx.recv().await {
                Some(Command::Submit(entry)) => {
                    queue.push_back(entry);
                    continue;
                }
                Some(Command::Shutdown) | None => break,
            }
        }

        let (head_id, head_attempts, head_last_attempt) = {
            let Some(head) = queue.front() else { continue };
            (head.id, head.attempts, head.last_attempt_at)
        };

        let head_cancelled = {
            let s = state.lock().unwrap();
            s.records.get(&head_id).is_some_and(|r| r.cancelled)
        };
        if head_cancelled {
            let Some(entry) = queue.pop_front() else { continue };
            warn!(queue = %config.name, task_id = %entry.id, "task cancelled before execution");
            let mut s = state.lock().unwrap();
            let error = TaskError::Cancelled(entry.id).to_string();
            finish(&mut s, entry.id, entry.attempts, Err(error));
            s.stats.cancelled += 1;
            continue;
        }

        // The head waits out its own retry window; entries behind it wait
        // their turn, matching the queue's head-of-line semantics.
        if let Some(last) = head_last_attempt {
            let ready_at = last + config.retry_policy.delay_for_attempt(head_attempts);
            if Instant::now() < ready_at {
                tokio::select! {
                    _ = tokio::time::sleep_until(ready_at) => {}
                    cmd = rx.recv() => match cmd {
                        Some(Command::Submit(entry)) => queue.push_back(entry),
                        Some(Command::Shutdown) | None => break,
                    }
                }
                continue;
            }
        }

        let Some(mut entry) = queue.pop_front() else { continue };
        entry.attempts += 1;
        entry.last_attempt_at = Some(Instant::now());
        {
            let mut s = state.lock().unwrap();
            if let Some(record) = s.records.get_mut(&entry.id) {
                record.status = TaskStatus::Processing;
                record.attempts = entry.attempts;
            }
        }
        debug!(
            queue = %config.name,
            task_id = %entry.id,
            attempt = entry.attempts,
            max_attempts = entry.max_attempts,
            "processing task"
        );

        match invoke(&entry, config.op_timeout).await {
            Ok(value) => {
                debug!(queue = %config.name, task_id = %entry.id, "task completed");
                {
                    let mut s = state.lock().unwrap();
                    finish(&mut s, entry.id, entry.attempts, Ok(value));
                    s.stats.completed += 1;
                }
                if let Some(target) = &config.invalidate {
                    target.invalidate();
                    debug!(queue = %config.name, task_id = %entry.id, "cache invalidated");
                }
            }
            Err(err) => {
                if entry.attempts >= entry.max_attempts {
                    warn!(
                        queue = %config.name,
                        task_id = %entry.id,
                        attempts = entry.attempts,
                        error = %err,
                        "task failed after exhausting attempts"
                    );
                    let mut s = state.lock().unwrap();
                    finish(&mut s, entry.id, entry.attempts, Err(err.to_string()));
                    s.stats.failed += 1;
                } else {
                    debug!(
                        queue = %config.name,
                        task_id = %entry.id,
                        attempt = entry.attempts,
                        error = %err,
                        "attempt failed, requeueing at tail"
                    );
                    {
                        let mut s = state.lock().unwrap();
                        if let Some(record) = s.records.get_mut(&entry.id) {
                            record.status = TaskStatus::Pending;
                        }
                        s.stats.retries += 1;
                    }
                    queue.push_back(entry);
                }
            }
        }
    }

    info!(queue = %config.name, "task queue worker stopped");
}

async fn invoke<T>(entry: &QueueEntry<T>, op_timeout: Option<Duration>) -> anyhow::Result<T> {
    let future = (entry.operation)();
    match op_timeout {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::TimedOut {
                context: entry.id.to_string(),
                elapsed: limit,
            }
            .into()),
        },
        None => future.await,
    }
}

fn finish<T>(state: &mut QueueState<T>, id: TaskId, attempts: u32, result: Result<T, String>) {
    if let Some(record) = state.records.get_mut(&id) {
        record.status = if result.is_ok() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        record.attempts = attempts;
        record.finished_at = Some(Utc::now());
        record.result = Some(result);
    }
}
