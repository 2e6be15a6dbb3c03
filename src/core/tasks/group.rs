// src/core/tasks/group.rs

//! Defines `TaskGroup`, the structured-concurrency owner of a session's
//! update tasks.
//!
//! Every task runs inside one `JoinSet` under a child of the group's root
//! cancellation token. An ownership map guarantees at most one live task per
//! key. Dropping the group cancels the root token and aborts whatever is left.

use super::update::{TaskDeps, TaskExit, TaskState, UpdateTask};
use crate::core::SyncError;
use crate::core::storage::{CacheKey, SchemaId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The bookkeeping kept for the task that owns a key.
#[derive(Debug)]
struct OwnedTask {
    id: u64,
    state: watch::Receiver<TaskState>,
    cancel: CancellationToken,
}

impl OwnedTask {
    fn is_live(&self) -> bool {
        *self.state.borrow() != TaskState::Cancelled
    }

    /// Cancellation was requested but the task has not stopped yet.
    fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Owns and supervises the update tasks of one session.
#[derive(Debug)]
pub struct TaskGroup {
    handle: Handle,
    root: CancellationToken,
    tasks: Mutex<JoinSet<(CacheKey, TaskExit)>>,
    owners: DashMap<CacheKey, OwnedTask>,
    closed: AtomicBool,
}

impl TaskGroup {
    /// Creates an empty group whose tasks will run on `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            root: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            owners: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Spawns an update task for `key` unless a live task already owns it.
    ///
    /// Returns a receiver for the new task's state, or `None` when the key was
    /// already owned. A key whose previous task has stopped gets a new task.
    pub fn ensure(
        &self,
        key: CacheKey,
        schema: SchemaId,
        deps: &TaskDeps,
    ) -> Result<Option<watch::Receiver<TaskState>>, SyncError> {
        self.reap();

        match self.owners.entry(key.clone()) {
            Entry::Occupied(owned) if owned.get().is_live() && !owned.get().is_stopping() => {
                Ok(None)
            }
            entry => {
                // A predecessor still winding down keeps the key until it has
                // stopped; the new task waits for it before its first update.
                let predecessor = match &entry {
                    Entry::Occupied(owned) if owned.get().is_live() => {
                        Some(owned.get().state.clone())
                    }
                    _ => None,
                };
                let task = UpdateTask::new(key.clone(), schema, deps.clone());
                let cancel = self.root.child_token();
                let owned = OwnedTask {
                    id: task.id(),
                    state: task.state(),
                    cancel: cancel.clone(),
                };
                let ready = owned.state.clone();
                {
                    // `closed` is flipped under this lock, so nothing is spawned
                    // after `shutdown` has taken the join set.
                    let mut tasks = self.tasks.lock();
                    if self.closed.load(Ordering::Acquire) {
                        return Err(SyncError::SessionClosed);
                    }
                    tasks.spawn_on(
                        async move {
                            if let Some(mut previous) = predecessor {
                                let _ = previous.wait_for(|s| *s == TaskState::Cancelled).await;
                            }
                            let exit = task.run(cancel).await;
                            (key, exit)
                        },
                        &self.handle,
                    );
                }
                debug!("Spawned update task #{}.", owned.id);
                entry.insert(owned);
                Ok(Some(ready))
            }
        }
    }

    /// Cancels the task owning `key` and waits until it has stopped.
    /// Returns false if no task owned the key.
    ///
    /// The key stays owned until the task has stopped. A concurrent `ensure`
    /// queues its replacement behind the stopping task.
    pub async fn cancel(&self, key: &CacheKey) -> bool {
        let Some((id, mut state, token)) = self
            .owners
            .get(key)
            .map(|owned| (owned.id, owned.state.clone(), owned.cancel.clone()))
        else {
            return false;
        };
        token.cancel();
        let _ = state
            .wait_for(|s| *s == TaskState::Cancelled)
            .await
            .map(|_| ());
        // A replacement spawned meanwhile keeps the key.
        self.owners.remove_if(key, |_, owned| owned.id == id);
        self.reap();
        true
    }

    /// The lifecycle state of the task owning `key`, if any task ever did.
    pub fn state_of(&self, key: &CacheKey) -> Option<TaskState> {
        self.owners.get(key).map(|owned| *owned.state.borrow())
    }

    /// The number of keys owned by a live task.
    pub fn active_count(&self) -> usize {
        self.owners.iter().filter(|owned| owned.is_live()).count()
    }

    /// The keys owned by a live task.
    pub fn live_keys(&self) -> Vec<CacheKey> {
        self.owners
            .iter()
            .filter(|owned| owned.is_live())
            .map(|owned| owned.key().clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Collects the results of tasks that have already finished.
    pub fn reap(&self) {
        let mut finished = Vec::new();
        {
            let mut tasks = self.tasks.lock();
            while let Some(res) = tasks.try_join_next() {
                finished.push(res);
            }
        }
        for res in finished {
            log_exit(res);
        }
    }

    /// Closes the group to new tasks, cancels every task and waits for all of
    /// them to finish. Idempotent.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        self.root.cancel();

        let pending = tasks.len();
        if pending > 0 {
            info!("Waiting for {} update task(s) to stop.", pending);
        }
        while let Some(res) = tasks.join_next().await {
            log_exit(res);
        }
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        // The JoinSet aborts anything still running when it is dropped right after.
        self.root.cancel();
    }
}

fn log_exit(res: Result<(CacheKey, TaskExit), tokio::task::JoinError>) {
    match res {
        Ok((key, TaskExit::Cancelled)) => debug!("Update task for '{}' cancelled.", key),
        Ok((key, TaskExit::Fatal(e))) => warn!("Update task for '{}' stopped: {}", key, e),
        Err(e) if e.is_panic() => warn!("Update task panicked: {}", e),
        Err(_) => {}
    }
}
