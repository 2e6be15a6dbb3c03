// tests/property/cache_test.rs

//! Property-based tests for slot ordering in the state cache

use marketsync::core::storage::{CacheKey, Entity, PutOutcome, StateCache};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_put_if_newer_matches_max_slot_model(
        writes in prop::collection::vec((0u8..4, 0u64..50), 1..=100)
    ) {
        let cache = StateCache::new();
        let mut model: HashMap<u8, u64> = HashMap::new();

        for (key, slot) in &writes {
            let outcome = cache.put_if_newer(
                CacheKey::named(format!("feed-{key}")),
                Entity::Counter(*slot),
                *slot,
            );
            match model.get(key) {
                None => prop_assert_eq!(outcome, PutOutcome::Inserted),
                Some(current) if *current > *slot => prop_assert_eq!(outcome, PutOutcome::Stale),
                Some(_) => prop_assert_eq!(outcome, PutOutcome::Replaced),
            }
            let entry = model.entry(*key).or_insert(*slot);
            *entry = (*entry).max(*slot);
        }

        prop_assert_eq!(cache.len(), model.len());
        for (key, slot) in &model {
            let entry = cache.get_entry(&CacheKey::named(format!("feed-{key}"))).unwrap();
            prop_assert_eq!(entry.slot, *slot);
            prop_assert_eq!(entry.value.as_counter(), Some(*slot));
        }
    }

    #[test]
    fn test_concurrent_writers_keep_the_highest_slot(
        mut slots in prop::collection::vec(0u64..10_000, 2..=64)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache = Arc::new(StateCache::new());
            let key = CacheKey::perp_oracle(0);

            let mut handles = Vec::new();
            for chunk in slots.chunks(8) {
                let cache = cache.clone();
                let key = key.clone();
                let chunk = chunk.to_vec();
                handles.push(tokio::spawn(async move {
                    for slot in chunk {
                        cache.put_if_newer(key.clone(), Entity::Counter(slot), slot);
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            slots.sort_unstable();
            let highest = *slots.last().unwrap();
            assert_eq!(cache.get_entry(&key).unwrap().slot, highest);
        });
    }

    #[test]
    fn test_clear_then_write_leaves_only_new_entries(
        before in prop::collection::hash_set(0u16..100, 0..=20),
        after in prop::collection::hash_set(0u16..100, 0..=20),
    ) {
        let cache = StateCache::new();
        for index in &before {
            cache.put(CacheKey::perp_market(*index), Entity::Counter(1));
        }
        cache.clear();
        prop_assert!(cache.is_empty());

        for index in &after {
            cache.put(CacheKey::spot_market(*index), Entity::Counter(2));
        }
        prop_assert_eq!(cache.len(), after.len());
        for index in &before {
            prop_assert!(!cache.contains_key(&CacheKey::perp_market(*index)));
        }
    }
}
