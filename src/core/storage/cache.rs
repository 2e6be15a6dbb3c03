// src/core/storage/cache.rs

//! Defines `StateCache`, the concurrent key-value store holding the latest
//! decoded value of every entity a session tracks.
//!
//! The live map is a `DashMap` (sharded, fine-grained locks) kept behind an
//! `Arc` inside a `parking_lot::RwLock`. Every operation holds the read side
//! only for the in-memory map operation itself. `clear()` takes the write side
//! just long enough to swap in a fresh map, which makes it a single point
//! event relative to concurrent reads and writes. No lock is held across an
//! `.await`.

use super::data_types::{CacheKey, Entity};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Initial capacity of a freshly created (or cleared) map.
const DEFAULT_CAPACITY: usize = 64;

type EntryMap = DashMap<CacheKey, CacheEntry>;

/// A published value together with the sequence marker it was produced at.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The decoded value. Replaced as a whole on every write.
    pub value: Arc<Entity>,
    /// The source sequence marker (slot) of the write. `0` for unsequenced writes.
    pub slot: u64,
    /// When this value was installed.
    pub updated_at: Instant,
}

/// The result of a sequenced write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was absent.
    Inserted,
    /// An older (or equally old) value was replaced.
    Replaced,
    /// The stored value is newer; the write was discarded.
    Stale,
}

/// A concurrent, session-scoped state cache.
#[derive(Debug)]
pub struct StateCache {
    current: RwLock<Arc<EntryMap>>,
    /// Number of completed `clear()` calls.
    generation: AtomicU64,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    /// Creates a new, empty cache.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(DashMap::with_capacity(DEFAULT_CAPACITY))),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the current value for `key`, if any. Never blocks on I/O.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Entity>> {
        let map = self.current.read();
        map.get(key).map(|entry| Arc::clone(&entry.value))
    }

    /// Returns the full entry for `key`, including its slot and write time.
    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let map = self.current.read();
        map.get(key).map(|entry| entry.clone())
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.current.read().contains_key(key)
    }

    /// Installs `value` for `key` unconditionally, returning the previous value.
    pub fn put(&self, key: CacheKey, value: Entity) -> Option<Arc<Entity>> {
        let entry = CacheEntry {
            value: Arc::new(value),
            slot: 0,
            updated_at: Instant::now(),
        };
        let map = self.current.read();
        map.insert(key, entry).map(|old| old.value)
    }

    /// Installs `value` unless the stored entry carries a newer slot.
    /// Equal slots are accepted, since sequence markers are non-decreasing.
    pub fn put_if_newer(&self, key: CacheKey, value: Entity, slot: u64) -> PutOutcome {
        let map = self.current.read();
        match map.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().slot > slot {
                    return PutOutcome::Stale;
                }
                occupied.insert(CacheEntry {
                    value: Arc::new(value),
                    slot,
                    updated_at: Instant::now(),
                });
                PutOutcome::Replaced
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value: Arc::new(value),
                    slot,
                    updated_at: Instant::now(),
                });
                PutOutcome::Inserted
            }
        }
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<Entity>> {
        let map = self.current.read();
        map.remove(key).map(|(_, entry)| entry.value)
    }

    /// Atomically drops every entry.
    ///
    /// Writes that returned before this call are gone afterwards; writes issued
    /// after it returns are visible. The retired map is freed outside the lock.
    pub fn clear(&self) {
        let retired = {
            let mut guard = self.current.write();
            if guard.is_empty() {
                self.generation.fetch_add(1, Ordering::Release);
                return;
            }
            let fresh = Arc::new(DashMap::with_capacity(guard.len().max(DEFAULT_CAPACITY)));
            let retired = std::mem::replace(&mut *guard, fresh);
            self.generation.fetch_add(1, Ordering::Release);
            retired
        };
        drop(retired);
    }

    /// A snapshot of the keys currently present.
    pub fn keys(&self) -> BTreeSet<CacheKey> {
        let map = self.current.read();
        map.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// The number of `clear()` calls observed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
