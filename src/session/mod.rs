// src/session/mod.rs

//! Sessions: the owner of a cache and its update tasks, the selectors used to
//! subscribe, and the synchronous read facade.

pub mod manager;
pub mod reader;
pub mod selector;

pub use manager::{Session, SubscribeReport};
pub use reader::CacheReader;
pub use selector::Selector;
