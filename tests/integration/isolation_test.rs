// tests/integration/isolation_test.rs

//! Sessions share nothing, and dropping one stops all of its work.

use super::test_helpers::{TestContext, wait_until};
use marketsync::Selector;
use marketsync::core::storage::CacheKey;
use std::time::Duration;

#[tokio::test]
async fn test_sessions_have_separate_caches() {
    let ctx = TestContext::new();
    let a = ctx.connect().await;
    let b = ctx.connect().await;
    assert_eq!(ctx.sources.opened(), 2);

    a.subscribe("counter").await.unwrap();
    assert!(wait_until(Duration::from_secs(1), || a.reader().counter("counter").is_some()).await);

    assert!(b.is_empty());
    assert!(b.reader().counter("counter").is_none());
    assert_eq!(b.active_task_count(), 0);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_clear_on_one_session_leaves_the_other() {
    let ctx = TestContext::new();
    let a = ctx.connect().await;
    let b = ctx.connect().await;

    a.subscribe(Selector::AllMarkets).await.unwrap();
    b.subscribe(Selector::AllMarkets).await.unwrap();
    assert!(wait_until(Duration::from_secs(1), || a.len() == 6 && b.len() == 6).await);

    a.clear();
    assert!(a.is_empty());
    assert_eq!(b.len(), 6);

    a.shutdown().await;
    assert_eq!(b.len(), 6);
    assert_eq!(b.active_task_count(), 6);
    b.shutdown().await;
}

#[tokio::test]
async fn test_dropping_a_session_stops_its_tasks() {
    let ctx = TestContext::new();
    let session = ctx.connect().await;
    session.subscribe(Selector::All).await.unwrap();
    assert!(wait_until(Duration::from_secs(1), || !session.is_empty()).await);

    let source = ctx.sources.last_source();
    drop(session);

    // Aborted tasks may finish the poll they are in; after that nothing runs.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = source.fetch_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.fetch_count(), settled);
}

#[tokio::test]
async fn test_shutdown_of_one_session_keeps_the_other_fetching() {
    let ctx = TestContext::new();
    let a = ctx.connect().await;
    let b = ctx.connect().await;
    let (source_b, key) = (ctx.sources.last_source(), CacheKey::named("counter"));

    a.subscribe("counter").await.unwrap();
    b.subscribe("counter").await.unwrap();
    a.shutdown().await;

    let before = source_b.slot_of(&key);
    assert!(wait_until(Duration::from_secs(1), || source_b.slot_of(&key) > before + 2).await);
    assert!(b.reader().counter("counter").is_some());

    b.shutdown().await;
}
