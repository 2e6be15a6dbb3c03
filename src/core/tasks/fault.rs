// src/core/tasks/fault.rs

//! Out-of-band fault records published by update tasks.

use crate::core::SyncError;
use crate::core::storage::CacheKey;
use std::fmt;
use strum_macros::Display;

/// What went wrong inside an update task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FaultKind {
    /// A fetch failed. The previous cached value stays visible.
    Fetch,
    /// A payload could not be decoded. The previous cached value stays visible.
    Decode,
    /// A stream errored, ended or could not be opened.
    Stream,
    /// The task stopped for good.
    Fatal,
}

/// One fault, as delivered on a session's fault channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFault {
    pub task_id: u64,
    pub key: CacheKey,
    pub kind: FaultKind,
    pub error: SyncError,
}

impl TaskFault {
    pub fn is_fatal(&self) -> bool {
        self.kind == FaultKind::Fatal
    }
}

impl fmt::Display for TaskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task #{} ({}) {} fault: {}",
            self.task_id, self.key, self.kind, self.error
        )
    }
}
