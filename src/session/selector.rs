// src/session/selector.rs

//! Describes which keys a `subscribe` or `unsubscribe` call targets.

use crate::core::SyncError;
use crate::core::addresses::Address;
use crate::core::source::SourceInfo;
use crate::core::storage::{CacheKey, SchemaId};
use std::collections::HashSet;

/// A set of keys, resolved against a session's discovered entity space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every market, every oracle and every named feed.
    All,
    /// Every perp and spot market account.
    AllMarkets,
    /// The oracle of every perp and spot market.
    AllOracles,
    /// The given perp markets and their oracles.
    PerpMarkets(Vec<u16>),
    /// The given spot markets and their oracles.
    SpotMarkets(Vec<u16>),
    Named(Vec<String>),
    Accounts(Vec<Address>),
    /// User accounts, by account address.
    Users(Vec<Address>),
    /// User stats accounts, by authority address.
    UserStats(Vec<Address>),
    Keys(Vec<CacheKey>),
}

impl Selector {
    /// Expands the selector into `(key, schema)` pairs, in order and without
    /// duplicates. Fails with `UnknownKey` on the first key outside `info`.
    pub fn resolve(&self, info: &SourceInfo) -> Result<Vec<(CacheKey, SchemaId)>, SyncError> {
        let keys: Vec<CacheKey> = match self {
            Selector::All => {
                let mut keys = market_keys(info);
                keys.extend(oracle_keys(info));
                keys.extend(info.named_feeds.iter().map(|f| CacheKey::named(&f.name)));
                keys
            }
            Selector::AllMarkets => market_keys(info),
            Selector::AllOracles => oracle_keys(info),
            Selector::PerpMarkets(indices) => indices
                .iter()
                .flat_map(|&i| [CacheKey::perp_market(i), CacheKey::perp_oracle(i)])
                .collect(),
            Selector::SpotMarkets(indices) => indices
                .iter()
                .flat_map(|&i| [CacheKey::spot_market(i), CacheKey::spot_oracle(i)])
                .collect(),
            Selector::Named(names) => names.iter().map(CacheKey::named).collect(),
            Selector::Accounts(addresses) => {
                addresses.iter().copied().map(CacheKey::Account).collect()
            }
            Selector::Users(addresses) => addresses.iter().copied().map(CacheKey::User).collect(),
            Selector::UserStats(authorities) => authorities
                .iter()
                .copied()
                .map(CacheKey::UserStats)
                .collect(),
            Selector::Keys(keys) => keys.clone(),
        };

        let mut seen = HashSet::with_capacity(keys.len());
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            let schema = info
                .schema_for(&key)
                .ok_or_else(|| SyncError::UnknownKey(key.to_string()))?;
            resolved.push((key, schema));
        }
        Ok(resolved)
    }
}

fn market_keys(info: &SourceInfo) -> Vec<CacheKey> {
    info.perp_markets
        .iter()
        .map(|&i| CacheKey::perp_market(i))
        .chain(info.spot_markets.iter().map(|&i| CacheKey::spot_market(i)))
        .collect()
}

fn oracle_keys(info: &SourceInfo) -> Vec<CacheKey> {
    info.perp_markets
        .iter()
        .map(|&i| CacheKey::perp_oracle(i))
        .chain(info.spot_markets.iter().map(|&i| CacheKey::spot_oracle(i)))
        .collect()
}

impl From<CacheKey> for Selector {
    fn from(key: CacheKey) -> Self {
        Selector::Keys(vec![key])
    }
}

impl From<Vec<CacheKey>> for Selector {
    fn from(keys: Vec<CacheKey>) -> Self {
        Selector::Keys(keys)
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Named(vec![name.to_string()])
    }
}
