// src/session/reader.rs

//! Defines `CacheReader`, the synchronous read facade over a session's cache.

use crate::core::addresses::Address;
use crate::core::storage::{
    AccountSnapshot, CacheEntry, CacheKey, Entity, OraclePriceData, Order, PerpMarket,
    PerpPosition, SpotMarket, SpotPosition, StateCache, UserAccount, UserStats,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A non-owning view of one session's cache. Never awaits and never fails:
/// a value that has not arrived yet (or was cleared) reads as `None`.
#[derive(Debug, Clone, Copy)]
pub struct CacheReader<'a> {
    cache: &'a StateCache,
}

impl<'a> CacheReader<'a> {
    pub fn new(cache: &'a StateCache) -> Self {
        Self { cache }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Entity>> {
        self.cache.get(key)
    }

    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache.get_entry(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn keys(&self) -> BTreeSet<CacheKey> {
        self.cache.keys()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drops every cached value. Running tasks repopulate the cache on their next update.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// The slot the current value of `key` was produced at.
    pub fn slot_of(&self, key: &CacheKey) -> Option<u64> {
        self.cache.get_entry(key).map(|entry| entry.slot)
    }

    pub fn perp_market(&self, index: u16) -> Option<PerpMarket> {
        self.typed(&CacheKey::perp_market(index), |e| e.as_perp_market().cloned())
    }

    pub fn spot_market(&self, index: u16) -> Option<SpotMarket> {
        self.typed(&CacheKey::spot_market(index), |e| e.as_spot_market().cloned())
    }

    pub fn perp_oracle(&self, index: u16) -> Option<OraclePriceData> {
        self.typed(&CacheKey::perp_oracle(index), |e| e.as_oracle().copied())
    }

    pub fn spot_oracle(&self, index: u16) -> Option<OraclePriceData> {
        self.typed(&CacheKey::spot_oracle(index), |e| e.as_oracle().copied())
    }

    pub fn account(&self, address: &Address) -> Option<AccountSnapshot> {
        self.typed(&CacheKey::Account(*address), |e| e.as_account().cloned())
    }

    pub fn user_account(&self, address: &Address) -> Option<UserAccount> {
        self.typed(&CacheKey::User(*address), |e| e.as_user().cloned())
    }

    pub fn user_stats(&self, authority: &Address) -> Option<UserStats> {
        self.typed(&CacheKey::UserStats(*authority), |e| e.as_user_stats().copied())
    }

    /// Open orders of a cached user account.
    pub fn orders(&self, address: &Address) -> Option<Vec<Order>> {
        self.user(address, |u| Some(u.open_orders()))
    }

    /// Non-empty perp and spot positions of a cached user account.
    pub fn positions(&self, address: &Address) -> Option<(Vec<PerpPosition>, Vec<SpotPosition>)> {
        self.user(address, |u| Some(u.active_positions()))
    }

    pub fn unsettled_positions(&self, address: &Address) -> Option<Vec<PerpPosition>> {
        self.user(address, |u| Some(u.unsettled_positions()))
    }

    pub fn perp_position(&self, address: &Address, market_index: u16) -> Option<PerpPosition> {
        self.user(address, |u| u.perp_position(market_index))
    }

    pub fn spot_position(&self, address: &Address, market_index: u16) -> Option<SpotPosition> {
        self.user(address, |u| u.spot_position(market_index))
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.typed(&CacheKey::named(name), Entity::as_counter)
    }

    fn user<T>(&self, address: &Address, extract: impl FnOnce(&UserAccount) -> Option<T>) -> Option<T> {
        self.typed(&CacheKey::User(*address), |e| e.as_user().and_then(extract))
    }

    fn typed<T>(&self, key: &CacheKey, extract: impl FnOnce(&Entity) -> Option<T>) -> Option<T> {
        self.cache.get(key).and_then(|entity| extract(&entity))
    }
}
