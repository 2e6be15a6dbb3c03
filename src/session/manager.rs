// src/session/manager.rs

//! Defines `Session`, the owner of one state cache and the update tasks
//! that keep it fresh.

use super::reader::CacheReader;
use super::selector::Selector;
use crate::config::UpdatesConfig;
use crate::core::SyncError;
use crate::core::context::Context;
use crate::core::metrics;
use crate::core::source::{DataSource, Decoder, NamedFeed, SourceInfo};
use crate::core::stats::{SessionStats, StatsSnapshot};
use crate::core::addresses::Address;
use crate::core::storage::{
    CacheKey, Entity, Order, PerpPosition, SchemaId, SpotPosition, StateCache, UserAccount,
    UserStats,
};
use crate::core::tasks::{RetryPolicy, TaskDeps, TaskFault, TaskGroup, TaskState, UpdateMode};
use crate::core::urls::Endpoint;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// What a `subscribe` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeReport {
    /// Keys that got a new update task.
    pub spawned: Vec<CacheKey>,
    /// Keys that were already owned by a live task.
    pub already_running: Vec<CacheKey>,
}

impl SubscribeReport {
    pub fn total(&self) -> usize {
        self.spawned.len() + self.already_running.len()
    }
}

/// A live connection to one data source, for one context.
///
/// Each session owns its own cache and its own tasks; nothing is shared
/// between sessions. Dropping a session stops all of its tasks.
pub struct Session {
    id: Uuid,
    context: Context,
    endpoint: Endpoint,
    info: SourceInfo,
    cache: Arc<StateCache>,
    stats: Arc<SessionStats>,
    faults: broadcast::Sender<TaskFault>,
    deps: TaskDeps,
    tasks: TaskGroup,
    shut_down: AtomicBool,
}

impl Session {
    /// Builds a task-free session. Only the connector creates sessions.
    pub(crate) fn new(
        context: Context,
        endpoint: Endpoint,
        info: SourceInfo,
        source: Arc<dyn DataSource>,
        decoder: Arc<dyn Decoder>,
        handle: Handle,
        updates: &UpdatesConfig,
    ) -> Self {
        let cache = Arc::new(StateCache::new());
        let stats = Arc::new(SessionStats::new());
        let (faults, _) = broadcast::channel(updates.fault_channel_capacity.max(1));
        let deps = TaskDeps {
            source,
            decoder,
            cache: Arc::clone(&cache),
            stats: Arc::clone(&stats),
            faults: faults.clone(),
            mode: UpdateMode::from_config(updates),
            retry: RetryPolicy::from_config(updates),
        };

        metrics::SESSIONS_OPENED_TOTAL.inc();
        metrics::OPEN_SESSIONS.inc();

        Self {
            id: Uuid::new_v4(),
            context,
            endpoint,
            info,
            cache,
            stats,
            faults,
            deps,
            tasks: TaskGroup::new(handle),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Starts keeping the selected keys fresh.
    ///
    /// Keys already owned by a live task are left alone. Returns once every
    /// newly spawned task has started running.
    pub async fn subscribe(
        &self,
        selector: impl Into<Selector>,
    ) -> Result<SubscribeReport, SyncError> {
        if self.is_shut_down() {
            return Err(SyncError::SessionClosed);
        }
        let targets = selector.into().resolve(&self.info)?;

        let mut report = SubscribeReport::default();
        let mut starting = Vec::new();
        for (key, schema) in targets {
            match self.tasks.ensure(key.clone(), schema, &self.deps)? {
                Some(state) => {
                    starting.push(state);
                    report.spawned.push(key);
                }
                None => report.already_running.push(key),
            }
        }

        for mut state in starting {
            let _ = state
                .wait_for(|s| *s != TaskState::Idle)
                .await
                .map(|_| ());
        }

        info!(
            "Session {} subscribed to {} key(s) ({} new).",
            self.id,
            report.total(),
            report.spawned.len()
        );
        Ok(report)
    }

    /// Stops the tasks owning the selected keys and waits for them to finish.
    /// Their last values stay cached. Returns how many tasks were stopped.
    pub async fn unsubscribe(&self, selector: impl Into<Selector>) -> Result<usize, SyncError> {
        let targets = selector.into().resolve(&self.info)?;
        let mut stopped = 0;
        for (key, _) in targets {
            if self.tasks.cancel(&key).await {
                stopped += 1;
            }
        }
        debug!("Session {} unsubscribed {} key(s).", self.id, stopped);
        Ok(stopped)
    }

    /// Cancels every task, waits for all of them, then clears the cache.
    /// Safe to call more than once and on a session that never subscribed.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down session {} ({}).", self.id, self.context);
        self.tasks.shutdown().await;
        self.cache.clear();
        metrics::OPEN_SESSIONS.dec();
        info!("Session {} shut down.", self.id);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Fetches and decodes one key directly from the source, bypassing the cache.
    pub async fn fetch(&self, key: &CacheKey) -> Result<Entity, SyncError> {
        let schema = self
            .info
            .schema_for(key)
            .ok_or_else(|| SyncError::UnknownKey(key.to_string()))?;
        let update = self.deps.source.fetch(key).await?;
        self.deps.decoder.decode(&update, schema)
    }

    // --- One-shot user queries ---

    /// Fetches a user account straight from the source.
    pub async fn get_user_account(&self, address: &Address) -> Result<UserAccount, SyncError> {
        let key = CacheKey::User(*address);
        match self.fetch(&key).await? {
            Entity::User(user) => Ok(user),
            other => Err(unexpected_schema(&key, SchemaId::User, &other)),
        }
    }

    /// Fetches the stats account of `authority` straight from the source.
    pub async fn get_user_stats(&self, authority: &Address) -> Result<UserStats, SyncError> {
        let key = CacheKey::UserStats(*authority);
        match self.fetch(&key).await? {
            Entity::UserStats(stats) => Ok(stats),
            other => Err(unexpected_schema(&key, SchemaId::UserStats, &other)),
        }
    }

    /// The open orders of a user account.
    pub async fn all_orders(&self, address: &Address) -> Result<Vec<Order>, SyncError> {
        Ok(self.get_user_account(address).await?.open_orders())
    }

    /// The non-empty perp and spot positions of a user account.
    pub async fn all_positions(
        &self,
        address: &Address,
    ) -> Result<(Vec<PerpPosition>, Vec<SpotPosition>), SyncError> {
        Ok(self.get_user_account(address).await?.active_positions())
    }

    /// Closed perp positions whose pnl has not been settled yet.
    pub async fn unsettled_positions(
        &self,
        address: &Address,
    ) -> Result<Vec<PerpPosition>, SyncError> {
        Ok(self.get_user_account(address).await?.unsettled_positions())
    }

    pub async fn perp_position(
        &self,
        address: &Address,
        market_index: u16,
    ) -> Result<Option<PerpPosition>, SyncError> {
        Ok(self.get_user_account(address).await?.perp_position(market_index))
    }

    pub async fn spot_position(
        &self,
        address: &Address,
        market_index: u16,
    ) -> Result<Option<SpotPosition>, SyncError> {
        Ok(self.get_user_account(address).await?.spot_position(market_index))
    }

    // --- Discovery ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn context_name(&self) -> &'static str {
        self.context.name()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn perp_market_count(&self) -> usize {
        self.info.perp_markets.len()
    }

    pub fn perp_market_indices(&self) -> &[u16] {
        &self.info.perp_markets
    }

    pub fn spot_market_count(&self) -> usize {
        self.info.spot_markets.len()
    }

    pub fn spot_market_indices(&self) -> &[u16] {
        &self.info.spot_markets
    }

    pub fn named_feeds(&self) -> &[NamedFeed] {
        &self.info.named_feeds
    }

    // --- Synchronous reads ---

    pub fn reader(&self) -> CacheReader<'_> {
        CacheReader::new(&self.cache)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Entity>> {
        self.cache.get(key)
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

    pub fn clear(&self) {
        self.cache.clear();
    }

    // --- Introspection ---

    /// The state of the task that owns (or last owned) `key`.
    pub fn task_state(&self, key: &CacheKey) -> Option<TaskState> {
        self.tasks.state_of(key)
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.active_count()
    }

    /// A receiver for faults reported by this session's tasks from now on.
    pub fn faults(&self) -> broadcast::Receiver<TaskFault> {
        self.faults.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

fn unexpected_schema(key: &CacheKey, expected: SchemaId, got: &Entity) -> SyncError {
    SyncError::Decode {
        key: key.to_string(),
        reason: format!("expected a {expected} record, decoded {}", got.schema()),
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session(context='{}', perp_markets={}, spot_markets={})",
            self.context,
            self.perp_market_count(),
            self.spot_market_count()
        )
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("endpoint", &self.endpoint)
            .field("active_tasks", &self.active_task_count())
            .field("cached", &self.len())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            metrics::OPEN_SESSIONS.dec();
            debug!("Session {} dropped without shutdown; aborting its tasks.", self.id);
        }
    }
}
