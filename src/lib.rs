// src/lib.rs

pub mod client;
pub mod config;
pub mod core;
pub mod session;

// Re-export
pub use crate::client::Connector;
pub use crate::core::{CacheKey, Context, Entity, StateCache, SyncError};
pub use crate::session::{CacheReader, Selector, Session};
