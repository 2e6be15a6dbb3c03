// tests/integration/task_test.rs

//! Update task behavior: lifecycle, stale updates, recoverable and fatal faults.

use super::test_helpers::{TestContext, fast_simulation, fast_updates, wait_until};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use marketsync::config::{SimulationConfig, UpdateModeKind, UpdatesConfig};
use marketsync::core::source::{
    DataSource, JsonDecoder, NamedFeed, RawUpdate, SimulatedSource, SourceConnector, SourceInfo,
    UpdateStream,
};
use marketsync::core::urls::Endpoint;
use marketsync::core::stats::SessionStats;
use marketsync::core::storage::{CacheKey, SchemaId, StateCache};
use marketsync::core::tasks::{
    FaultKind, RetryPolicy, TaskDeps, TaskExit, TaskState, UpdateMode, UpdateTask,
};
use marketsync::{Connector, Context, Selector, SyncError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Serves a fixed script of updates, then errors on every further fetch.
/// `subscribe` returns the remaining script as a finite stream.
struct ScriptedSource {
    script: Mutex<VecDeque<RawUpdate>>,
}

impl ScriptedSource {
    fn new(script: Vec<RawUpdate>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn handshake(&self) -> Result<SourceInfo, SyncError> {
        Ok(SourceInfo::default())
    }

    async fn fetch(&self, key: &CacheKey) -> Result<RawUpdate, SyncError> {
        self.script.lock().pop_front().ok_or_else(|| SyncError::Fetch {
            key: key.to_string(),
            reason: "script exhausted".to_string(),
        })
    }

    async fn subscribe(&self, _key: &CacheKey) -> Result<UpdateStream, SyncError> {
        let items: Vec<_> = self.script.lock().drain(..).map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Panics on every fetch, as a buggy source implementation might.
struct PanickingSource;

#[async_trait]
impl DataSource for PanickingSource {
    async fn handshake(&self) -> Result<SourceInfo, SyncError> {
        Ok(SourceInfo {
            named_feeds: vec![NamedFeed {
                name: "counter".to_string(),
                schema: SchemaId::Counter,
            }],
            ..SourceInfo::default()
        })
    }

    async fn fetch(&self, _key: &CacheKey) -> Result<RawUpdate, SyncError> {
        panic!("source bug");
    }

    async fn subscribe(&self, _key: &CacheKey) -> Result<UpdateStream, SyncError> {
        panic!("source bug");
    }
}

struct PanickingConnector;

#[async_trait]
impl SourceConnector for PanickingConnector {
    async fn open(
        &self,
        _endpoint: &Endpoint,
        _context: Context,
    ) -> Result<Arc<dyn DataSource>, SyncError> {
        Ok(Arc::new(PanickingSource))
    }
}

fn counter_update(slot: u64, payload: &'static [u8]) -> RawUpdate {
    RawUpdate {
        key: CacheKey::named("counter"),
        slot,
        payload: Bytes::from_static(payload),
    }
}

fn deps_for(source: Arc<dyn DataSource>, mode: UpdateMode, retry: RetryPolicy) -> TaskDeps {
    let (faults, _) = broadcast::channel(64);
    TaskDeps {
        source,
        decoder: Arc::new(JsonDecoder),
        cache: Arc::new(StateCache::new()),
        stats: Arc::new(SessionStats::new()),
        faults,
        mode,
        retry,
    }
}

const FAST_POLL: UpdateMode = UpdateMode::Poll {
    interval: Duration::from_millis(5),
};

#[tokio::test]
async fn test_task_lifecycle_idle_running_cancelled() {
    let source = Arc::new(SimulatedSource::new(Context::MainNet, fast_simulation()));
    let deps = deps_for(source, FAST_POLL, RetryPolicy::default());
    let cache = deps.cache.clone();

    let task = UpdateTask::new(CacheKey::named("counter"), SchemaId::Counter, deps);
    let mut state = task.state();
    assert_eq!(*state.borrow(), TaskState::Idle);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(task.run(cancel.clone()));
    state.wait_for(|s| *s == TaskState::Running).await.unwrap();

    assert!(wait_until(Duration::from_secs(1), || cache.len() == 1).await);
    cancel.cancel();
    assert_eq!(handle.await.unwrap(), TaskExit::Cancelled);
    assert_eq!(*state.borrow(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_aborted_task_still_reports_cancelled() {
    let source = Arc::new(SimulatedSource::new(Context::MainNet, fast_simulation()));
    let deps = deps_for(source, FAST_POLL, RetryPolicy::default());

    let task = UpdateTask::new(CacheKey::perp_market(0), SchemaId::PerpMarket, deps);
    let mut state = task.state();
    let handle = tokio::spawn(task.run(CancellationToken::new()));
    state.wait_for(|s| *s == TaskState::Running).await.unwrap();

    handle.abort();
    let _ = handle.await;
    assert_eq!(*state.borrow(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_stale_update_is_dropped_before_decoding() {
    // Slot 3 arrives after slot 5 and is not even valid JSON.
    let script = vec![
        counter_update(5, b"5"),
        counter_update(3, b"{broken"),
        counter_update(6, b"6"),
    ];
    let source = Arc::new(ScriptedSource::new(script));
    let deps = deps_for(source, FAST_POLL, RetryPolicy::default());
    let (cache, stats) = (deps.cache.clone(), deps.stats.clone());

    let task = UpdateTask::new(CacheKey::named("counter"), SchemaId::Counter, deps);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(task.run(cancel.clone()));

    let key = CacheKey::named("counter");
    assert!(wait_until(Duration::from_secs(1), || cache.get_entry(&key).map(|e| e.slot) == Some(6)).await);
    cancel.cancel();
    handle.await.unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.applied, 2);
    assert_eq!(snapshot.stale, 1);
    assert_eq!(snapshot.decode_errors, 0);
    assert_eq!(cache.get(&key).unwrap().as_counter(), Some(6));
}

#[tokio::test]
async fn test_decode_errors_keep_previous_value() {
    let simulation = SimulationConfig {
        corrupt_every: 3,
        ..fast_simulation()
    };
    let ctx = TestContext::with_config(simulation, fast_updates());
    let session = ctx.connect().await;
    let mut faults = session.faults();
    session.subscribe("counter").await.unwrap();

    // Slot 3 is corrupt; the value from slot 2 stays cached.
    let fault = tokio::time::timeout(Duration::from_secs(1), faults.recv())
        .await
        .expect("no fault reported")
        .unwrap();
    assert_eq!(fault.kind, FaultKind::Decode);
    assert_eq!(fault.key, CacheKey::named("counter"));
    assert!(matches!(fault.error, SyncError::Decode { .. }));
    let kept = session.reader().counter("counter").expect("value was dropped");
    assert!(kept >= 2 && kept % 3 != 0, "unexpected counter {kept}");

    // The task survives and moves past the bad payload.
    let reader = session.reader();
    assert!(wait_until(Duration::from_secs(1), || reader.counter("counter").unwrap_or(0) >= 4).await);
    assert_eq!(
        session.task_state(&CacheKey::named("counter")),
        Some(TaskState::Running)
    );
    assert!(session.stats().decode_errors >= 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_fatal_fault_stops_only_that_task() {
    let simulation = SimulationConfig {
        unavailable: vec!["perp_oracle:1".to_string()],
        ..fast_simulation()
    };
    let ctx = TestContext::with_config(simulation, fast_updates());
    let session = ctx.connect().await;
    let mut faults = session.faults();
    session
        .subscribe(Selector::PerpMarkets(vec![0, 1]))
        .await
        .unwrap();

    let dead = CacheKey::perp_oracle(1);
    assert!(
        wait_until(Duration::from_secs(1), || session.task_state(&dead)
            == Some(TaskState::Cancelled))
        .await
    );
    let fault = faults.recv().await.unwrap();
    assert_eq!(fault.kind, FaultKind::Fatal);
    assert_eq!(fault.key, dead);
    assert!(fault.error.is_fatal());

    // Everything else keeps updating.
    assert_eq!(session.active_task_count(), 3);
    let reader = session.reader();
    assert!(wait_until(Duration::from_secs(1), || reader.perp_oracle(0).is_some()
        && reader.perp_market(1).is_some())
    .await);
    assert!(reader.perp_oracle(1).is_none());
    assert_eq!(session.stats().fatal_faults, 1);

    // A dead key is spawned again on re-subscribe.
    let report = session.subscribe(dead.clone()).await.unwrap();
    assert_eq!(report.spawned, vec![dead]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_consecutive_failures_escalate_to_fatal() {
    let simulation = SimulationConfig {
        corrupt_every: 1,
        ..fast_simulation()
    };
    let updates = UpdatesConfig {
        max_consecutive_failures: 3,
        ..fast_updates()
    };
    let ctx = TestContext::with_config(simulation, updates);
    let session = ctx.connect().await;
    session.subscribe("counter").await.unwrap();

    let key = CacheKey::named("counter");
    assert!(
        wait_until(Duration::from_secs(1), || session.task_state(&key)
            == Some(TaskState::Cancelled))
        .await
    );
    let stats = session.stats();
    assert_eq!(stats.decode_errors, 3);
    assert_eq!(stats.fatal_faults, 1);
    assert!(session.get(&key).is_none());
}

#[tokio::test]
async fn test_stream_mode_keeps_cache_fresh() {
    let updates = UpdatesConfig {
        mode: UpdateModeKind::Stream,
        ..fast_updates()
    };
    let ctx = TestContext::with_config(fast_simulation(), updates);
    let session = ctx.connect().await;
    session.subscribe("counter").await.unwrap();

    let reader = session.reader();
    assert!(wait_until(Duration::from_secs(1), || reader.counter("counter").unwrap_or(0) >= 5).await);

    session.shutdown().await;
}

#[tokio::test]
async fn test_stream_gives_up_after_resubscribe_attempts() {
    let source = Arc::new(ScriptedSource::new(vec![counter_update(1, b"1")]));
    let retry = RetryPolicy {
        max_consecutive_failures: 0,
        resubscribe_backoff: Duration::from_millis(5),
        max_resubscribe_attempts: 2,
    };
    let deps = deps_for(source, UpdateMode::Stream, retry);
    let cache = deps.cache.clone();
    let mut faults = deps.faults.subscribe();

    let task = UpdateTask::new(CacheKey::named("counter"), SchemaId::Counter, deps);
    let exit = tokio::time::timeout(Duration::from_secs(1), task.run(CancellationToken::new()))
        .await
        .expect("task should give up");

    assert_eq!(exit, TaskExit::Fatal(SyncError::StreamClosed("counter".to_string())));
    assert_eq!(cache.get(&CacheKey::named("counter")).unwrap().as_counter(), Some(1));

    let mut kinds = Vec::new();
    while let Ok(fault) = faults.try_recv() {
        kinds.push(fault.kind);
    }
    // Initial stream ends, two re-opens end, then the task gives up.
    assert_eq!(
        kinds,
        vec![FaultKind::Stream, FaultKind::Stream, FaultKind::Stream, FaultKind::Fatal]
    );
}

#[tokio::test]
async fn test_cancel_discards_in_flight_fetch() {
    let simulation = SimulationConfig {
        latency: Duration::from_millis(300),
        ..fast_simulation()
    };
    let ctx = TestContext::with_config(simulation, fast_updates());
    let session = ctx.connect().await;
    session.subscribe(CacheKey::perp_market(0)).await.unwrap();

    let started = Instant::now();
    let stopped = session.unsubscribe(CacheKey::perp_market(0)).await.unwrap();
    assert_eq!(stopped, 1);
    assert!(started.elapsed() < Duration::from_millis(250));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(session.get(&CacheKey::perp_market(0)).is_none());
    assert_eq!(session.stats().applied, 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_panicking_task_reports_fatal_fault() {
    let connector = Connector::new(Arc::new(PanickingConnector), tokio::runtime::Handle::current())
        .with_updates(fast_updates());
    let session = connector
        .connect("https://api.mainnet-beta.solana.com", "mainnet")
        .await
        .unwrap();
    let mut faults = session.faults();
    session.subscribe("counter").await.unwrap();

    let fault = tokio::time::timeout(Duration::from_secs(1), faults.recv())
        .await
        .expect("no fault reported")
        .unwrap();
    assert_eq!(fault.kind, FaultKind::Fatal);
    assert_eq!(fault.key, CacheKey::named("counter"));
    assert!(matches!(fault.error, SyncError::Internal(_)));

    let key = CacheKey::named("counter");
    assert!(
        wait_until(Duration::from_secs(1), || session.task_state(&key)
            == Some(TaskState::Cancelled))
        .await
    );
    assert_eq!(session.stats().fatal_faults, 1);
    assert_eq!(session.active_task_count(), 0);

    session.shutdown().await;
}
