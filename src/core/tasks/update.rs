// src/core/tasks/update.rs

//! Implements `UpdateTask`, the background task that keeps one cache key fresh.
//!
//! A task is created Idle, becomes Running when its future is first polled and
//! becomes Cancelled when that future ends for any reason (cancellation, a
//! fatal fault, an abort or a panic). The last transition is made by an RAII
//! guard so it cannot be skipped, and a panic is reported as a fatal fault.

use super::fault::{FaultKind, TaskFault};
use crate::config::{UpdateModeKind, UpdatesConfig};
use crate::core::SyncError;
use crate::core::metrics;
use crate::core::source::{DataSource, Decoder, RawUpdate};
use crate::core::stats::SessionStats;
use crate::core::storage::{CacheKey, PutOutcome, SchemaId, StateCache};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use strum_macros::Display;
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Process-wide task id allocator.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of an update task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TaskState {
    Idle,
    Running,
    Cancelled,
}

/// How a task obtains new values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Fetch on a fixed interval. The first fetch happens immediately; missed
    /// ticks are delayed rather than bursted.
    Poll { interval: Duration },
    /// Consume a push subscription, re-opening it after failures.
    Stream,
}

impl UpdateMode {
    pub fn from_config(config: &UpdatesConfig) -> Self {
        match config.mode {
            UpdateModeKind::Poll => UpdateMode::Poll {
                interval: config.poll_interval,
            },
            UpdateModeKind::Stream => UpdateMode::Stream,
        }
    }
}

/// Failure tolerance of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive recoverable failures before the task turns fatal. `0` means never.
    pub max_consecutive_failures: u32,
    pub resubscribe_backoff: Duration,
    pub max_resubscribe_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &UpdatesConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            resubscribe_backoff: config.resubscribe_backoff,
            max_resubscribe_attempts: config.max_resubscribe_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UpdatesConfig::default())
    }
}

/// Why a task's run loop returned.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskExit {
    /// The cancellation token fired.
    Cancelled,
    /// The task hit an unrecoverable fault.
    Fatal(SyncError),
}

/// The collaborators an update task writes through. Injected explicitly,
/// shared by every task of one session.
#[derive(Clone)]
pub struct TaskDeps {
    pub source: Arc<dyn DataSource>,
    pub decoder: Arc<dyn Decoder>,
    pub cache: Arc<StateCache>,
    pub stats: Arc<SessionStats>,
    pub faults: broadcast::Sender<TaskFault>,
    pub mode: UpdateMode,
    pub retry: RetryPolicy,
}

/// A background task that keeps one key of one cache fresh.
pub struct UpdateTask {
    id: u64,
    key: CacheKey,
    schema: SchemaId,
    deps: TaskDeps,
    state: watch::Sender<TaskState>,
}

impl UpdateTask {
    /// Creates an Idle task. Nothing happens until `run` is polled.
    pub fn new(key: CacheKey, schema: SchemaId, deps: TaskDeps) -> Self {
        let (state, _) = watch::channel(TaskState::Idle);
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            key,
            schema,
            deps,
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// A receiver that observes this task's lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// The main run loop. Returns when `cancel` fires or a fatal fault occurs.
    pub async fn run(self, cancel: CancellationToken) -> TaskExit {
        let UpdateTask {
            id,
            key,
            schema,
            deps,
            state,
        } = self;
        let _guard = TaskStateGuard::enter(state, id, key.clone(), &deps);

        let mode = deps.mode;
        let mut pipeline = Pipeline {
            id,
            key,
            schema,
            deps,
            last_slot: 0,
            consecutive_failures: 0,
        };
        match mode {
            UpdateMode::Poll { interval } => pipeline.poll(interval, &cancel).await,
            UpdateMode::Stream => pipeline.stream(&cancel).await,
        }
    }
}

/// Moves a task to Running on creation and to Cancelled on drop, whatever
/// the reason the task's future ended. A drop during unwinding means the task
/// panicked; that is published as a fatal fault.
struct TaskStateGuard {
    state: watch::Sender<TaskState>,
    id: u64,
    key: CacheKey,
    faults: broadcast::Sender<TaskFault>,
    stats: Arc<SessionStats>,
}

impl TaskStateGuard {
    fn enter(state: watch::Sender<TaskState>, id: u64, key: CacheKey, deps: &TaskDeps) -> Self {
        state.send_replace(TaskState::Running);
        metrics::ACTIVE_UPDATE_TASKS.inc();
        debug!("Update task #{} for '{}' started.", id, key);
        Self {
            state,
            id,
            key,
            faults: deps.faults.clone(),
            stats: Arc::clone(&deps.stats),
        }
    }
}

impl Drop for TaskStateGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.stats.record_fatal();
            metrics::FATAL_TASK_FAULTS_TOTAL.inc();
            let fault = TaskFault {
                task_id: self.id,
                key: self.key.clone(),
                kind: FaultKind::Fatal,
                error: SyncError::Internal("update task panicked".to_string()),
            };
            warn!("{}", fault);
            let _ = self.faults.send(fault);
        }
        self.state.send_replace(TaskState::Cancelled);
        metrics::ACTIVE_UPDATE_TASKS.dec();
        debug!("Update task #{} for '{}' stopped.", self.id, self.key);
    }
}

/// The per-task mutable state of a running update loop.
struct Pipeline {
    id: u64,
    key: CacheKey,
    schema: SchemaId,
    deps: TaskDeps,
    /// Highest slot applied by this task.
    last_slot: u64,
    consecutive_failures: u32,
}

impl Pipeline {
    async fn poll(&mut self, every: Duration, cancel: &CancellationToken) -> TaskExit {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return TaskExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            // A fetch still in flight when the token fires is dropped unapplied.
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TaskExit::Cancelled,
                res = self.deps.source.fetch(&self.key) => res,
            };
            metrics::FETCH_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

            let outcome = match fetched {
                Ok(update) => self.apply(update),
                Err(e) if e.is_fatal() => Err(self.fatal(e)),
                Err(e) => {
                    self.deps.stats.record_fetch_error();
                    metrics::FETCH_ERRORS_TOTAL.inc();
                    self.report(FaultKind::Fetch, e);
                    self.note_failure()
                }
            };
            if let Err(exit) = outcome {
                return exit;
            }
        }
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> TaskExit {
        let mut attempts: u32 = 0;

        loop {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TaskExit::Cancelled,
                res = self.deps.source.subscribe(&self.key) => res,
            };

            match opened {
                Ok(mut updates) => loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return TaskExit::Cancelled,
                        item = updates.next() => item,
                    };
                    match next {
                        Some(Ok(update)) => {
                            attempts = 0;
                            if let Err(exit) = self.apply(update) {
                                return exit;
                            }
                        }
                        Some(Err(e)) if e.is_fatal() => return self.fatal(e),
                        Some(Err(e)) => {
                            self.deps.stats.record_fetch_error();
                            metrics::FETCH_ERRORS_TOTAL.inc();
                            self.report(FaultKind::Stream, e);
                            if let Err(exit) = self.note_failure() {
                                return exit;
                            }
                        }
                        None => {
                            self.report(FaultKind::Stream, SyncError::StreamClosed(self.key.to_string()));
                            break;
                        }
                    }
                },
                Err(e) if e.is_fatal() => return self.fatal(e),
                Err(e) => {
                    self.deps.stats.record_fetch_error();
                    metrics::FETCH_ERRORS_TOTAL.inc();
                    self.report(FaultKind::Stream, e);
                }
            }

            attempts += 1;
            if attempts > self.deps.retry.max_resubscribe_attempts {
                return self.fatal(SyncError::StreamClosed(self.key.to_string()));
            }
            debug!(
                "Re-opening stream for '{}' (attempt {}/{}).",
                self.key, attempts, self.deps.retry.max_resubscribe_attempts
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return TaskExit::Cancelled,
                _ = sleep(self.deps.retry.resubscribe_backoff) => {}
            }
        }
    }

    /// Decodes and publishes one update. Updates older than the last applied
    /// slot are dropped before decoding.
    fn apply(&mut self, update: RawUpdate) -> Result<(), TaskExit> {
        if update.slot < self.last_slot {
            self.record_stale();
            return Ok(());
        }

        let entity = match self.deps.decoder.decode(&update, self.schema) {
            Ok(entity) => entity,
            Err(e) => {
                self.deps.stats.record_decode_error();
                metrics::DECODE_ERRORS_TOTAL.inc();
                self.report(FaultKind::Decode, e);
                return self.note_failure();
            }
        };

        match self
            .deps
            .cache
            .put_if_newer(self.key.clone(), entity, update.slot)
        {
            PutOutcome::Stale => self.record_stale(),
            PutOutcome::Inserted | PutOutcome::Replaced => {
                self.last_slot = update.slot;
                self.deps.stats.record_applied();
                metrics::UPDATES_APPLIED_TOTAL
                    .with_label_values(&[&self.schema.to_string()])
                    .inc();
            }
        }
        self.consecutive_failures = 0;
        Ok(())
    }

    fn record_stale(&self) {
        self.deps.stats.record_stale();
        metrics::STALE_UPDATES_TOTAL.inc();
    }

    /// Counts a recoverable failure and escalates once the configured limit is hit.
    fn note_failure(&mut self) -> Result<(), TaskExit> {
        self.consecutive_failures += 1;
        let limit = self.deps.retry.max_consecutive_failures;
        if limit > 0 && self.consecutive_failures >= limit {
            return Err(self.fatal(SyncError::SourceUnavailable {
                key: self.key.to_string(),
                reason: format!("{} consecutive failures", self.consecutive_failures),
            }));
        }
        Ok(())
    }

    fn fatal(&self, error: SyncError) -> TaskExit {
        self.deps.stats.record_fatal();
        metrics::FATAL_TASK_FAULTS_TOTAL.inc();
        self.report(FaultKind::Fatal, error.clone());
        TaskExit::Fatal(error)
    }

    fn report(&self, kind: FaultKind, error: SyncError) {
        let fault = TaskFault {
            task_id: self.id,
            key: self.key.clone(),
            kind,
            error,
        };
        warn!("{}", fault);
        // No subscribers is fine; faults are also counted in the stats.
        let _ = self.deps.faults.send(fault);
    }
}
