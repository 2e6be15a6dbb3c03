// src/core/storage/mod.rs

//! The session-scoped state cache and the key/value types it stores.

pub mod cache;
pub mod data_types;
pub mod user;

pub use cache::{CacheEntry, PutOutcome, StateCache};
pub use data_types::{
    AccountSnapshot, CacheKey, Entity, MarketId, MarketKind, MarketStatus, OraclePriceData,
    PerpMarket, SchemaId, SpotMarket,
};
pub use user::{
    Order, OrderStatus, OrderType, PerpPosition, SpotBalanceType, SpotPosition, UserAccount,
    UserStats,
};
