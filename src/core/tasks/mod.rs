// src/core/tasks/mod.rs

//! The background update tasks that keep a session's cache fresh, and the
//! group that owns them.

pub mod fault;
pub mod group;
pub mod update;

pub use fault::{FaultKind, TaskFault};
pub use group::TaskGroup;
pub use update::{RetryPolicy, TaskDeps, TaskExit, TaskState, UpdateMode, UpdateTask};
