// src/core/storage/data_types.rs

//! Defines the keys and values held by the state cache: the `CacheKey` enum,
//! the tagged `Entity` enum and the record types behind each variant.

use super::user::{UserAccount, UserStats};
use crate::core::addresses::Address;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;

/// Whether a market is a perpetual or a spot market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Perp,
    Spot,
}

/// Identifies one market by kind and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId {
    pub kind: MarketKind,
    pub index: u16,
}

impl MarketId {
    pub const fn perp(index: u16) -> Self {
        Self {
            kind: MarketKind::Perp,
            index,
        }
    }

    pub const fn spot(index: u16) -> Self {
        Self {
            kind: MarketKind::Spot,
            index,
        }
    }
}

/// The schema an update payload is decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SchemaId {
    PerpMarket,
    SpotMarket,
    Oracle,
    Account,
    User,
    UserStats,
    Counter,
    Raw,
}

/// A key in the state cache. Keys are unique within one session's cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheKey {
    /// A market account.
    Market(MarketId),
    /// The oracle price feed backing a market.
    Oracle(MarketId),
    /// Any other account, kept as a raw snapshot.
    Account(Address),
    /// A user (sub-)account, by account address.
    User(Address),
    /// The stats account of an authority, by authority address.
    UserStats(Address),
    /// An open-ended feed identified by name.
    Named(String),
}

impl CacheKey {
    pub const fn perp_market(index: u16) -> Self {
        CacheKey::Market(MarketId::perp(index))
    }

    pub const fn spot_market(index: u16) -> Self {
        CacheKey::Market(MarketId::spot(index))
    }

    pub const fn perp_oracle(index: u16) -> Self {
        CacheKey::Oracle(MarketId::perp(index))
    }

    pub const fn spot_oracle(index: u16) -> Self {
        CacheKey::Oracle(MarketId::spot(index))
    }

    pub fn named(name: impl Into<String>) -> Self {
        CacheKey::Named(name.into())
    }

    /// The schema implied by the key kind. Named feeds carry no implied
    /// schema; the data source advertises one for each of them.
    pub fn default_schema(&self) -> Option<SchemaId> {
        match self {
            CacheKey::Market(MarketId {
                kind: MarketKind::Perp,
                ..
            }) => Some(SchemaId::PerpMarket),
            CacheKey::Market(MarketId {
                kind: MarketKind::Spot,
                ..
            }) => Some(SchemaId::SpotMarket),
            CacheKey::Oracle(_) => Some(SchemaId::Oracle),
            CacheKey::Account(_) => Some(SchemaId::Account),
            CacheKey::User(_) => Some(SchemaId::User),
            CacheKey::UserStats(_) => Some(SchemaId::UserStats),
            CacheKey::Named(_) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Market(id) => write!(f, "{}_market:{}", id.kind, id.index),
            CacheKey::Oracle(id) => write!(f, "{}_oracle:{}", id.kind, id.index),
            CacheKey::Account(addr) => write!(f, "account:{addr}"),
            CacheKey::User(addr) => write!(f, "user:{addr}"),
            CacheKey::UserStats(addr) => write!(f, "user_stats:{addr}"),
            CacheKey::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(name: &str) -> Self {
        CacheKey::Named(name.to_string())
    }
}

/// Trading status of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    #[default]
    Active,
    ReduceOnly,
    Settlement,
    Delisted,
}

/// A decoded perpetual market account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpMarket {
    pub market_index: u16,
    pub name: String,
    #[serde(default)]
    pub status: MarketStatus,
    pub amm_base_asset_reserve: u64,
    pub amm_quote_asset_reserve: u64,
    pub amm_peg_multiplier: u64,
    pub amm_last_funding_rate: i64,
    pub order_tick_size: u64,
    pub order_step_size: u64,
}

impl PerpMarket {
    /// The AMM reserve price: `quote_reserve * peg / base_reserve`.
    pub fn amm_price(&self) -> Option<f64> {
        if self.amm_base_asset_reserve == 0 {
            return None;
        }
        Some(
            self.amm_quote_asset_reserve as f64 * self.amm_peg_multiplier as f64
                / self.amm_base_asset_reserve as f64,
        )
    }
}

/// A decoded spot market account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotMarket {
    pub market_index: u16,
    pub name: String,
    #[serde(default)]
    pub status: MarketStatus,
    pub decimals: u32,
    pub deposit_balance: u64,
    pub borrow_balance: u64,
    pub order_tick_size: u64,
    pub order_step_size: u64,
}

/// An oracle price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePriceData {
    pub price: i64,
    pub confidence: u64,
    pub delay: i64,
    pub slot: u64,
}

/// The raw state of an arbitrary account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub address: Address,
    pub owner: Address,
    pub lamports: u64,
    pub data: Bytes,
}

/// A decoded, immutable value stored in the cache. One variant per known schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Entity {
    PerpMarket(PerpMarket),
    SpotMarket(SpotMarket),
    Oracle(OraclePriceData),
    Account(AccountSnapshot),
    User(UserAccount),
    UserStats(UserStats),
    Counter(u64),
    Raw(Bytes),
}

impl Entity {
    /// The schema this value was decoded with.
    pub fn schema(&self) -> SchemaId {
        match self {
            Entity::PerpMarket(_) => SchemaId::PerpMarket,
            Entity::SpotMarket(_) => SchemaId::SpotMarket,
            Entity::Oracle(_) => SchemaId::Oracle,
            Entity::Account(_) => SchemaId::Account,
            Entity::User(_) => SchemaId::User,
            Entity::UserStats(_) => SchemaId::UserStats,
            Entity::Counter(_) => SchemaId::Counter,
            Entity::Raw(_) => SchemaId::Raw,
        }
    }

    pub fn as_perp_market(&self) -> Option<&PerpMarket> {
        match self {
            Entity::PerpMarket(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_spot_market(&self) -> Option<&SpotMarket> {
        match self {
            Entity::SpotMarket(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_oracle(&self) -> Option<&OraclePriceData> {
        match self {
            Entity::Oracle(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<&AccountSnapshot> {
        match self {
            Entity::Account(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserAccount> {
        match self {
            Entity::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_user_stats(&self) -> Option<&UserStats> {
        match self {
            Entity::UserStats(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<u64> {
        match self {
            Entity::Counter(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Entity::Raw(b) => Some(b),
            _ => None,
        }
    }
}
