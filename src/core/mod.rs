// src/core/mod.rs

//! The central module containing the core logic and data structures of marketsync.

pub mod addresses;
pub mod context;
pub mod errors;
pub mod math;
pub mod metrics;
pub mod runtime;
pub mod source;
pub mod stats;
pub mod storage;
pub mod tasks;
pub mod urls;

pub use context::Context;
pub use errors::SyncError;
pub use storage::{CacheKey, Entity, StateCache};
