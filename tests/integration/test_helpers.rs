// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use async_trait::async_trait;
use marketsync::config::{ConnectConfig, SimulationConfig, UpdatesConfig};
use marketsync::core::Context;
use marketsync::core::source::{DataSource, SimulatedConnector, SimulatedSource, SourceConnector};
use marketsync::core::urls::Endpoint;
use marketsync::{Connector, Session, SyncError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const ENDPOINT: &str = "https://api.mainnet-beta.solana.com";

/// Installs a quiet subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A small, fast simulated feed.
pub fn fast_simulation() -> SimulationConfig {
    SimulationConfig {
        perp_markets: 4,
        spot_markets: 2,
        tick: Duration::from_millis(10),
        ..SimulationConfig::default()
    }
}

/// Poll every 10ms and give up on nothing.
pub fn fast_updates() -> UpdatesConfig {
    UpdatesConfig {
        poll_interval: Duration::from_millis(10),
        resubscribe_backoff: Duration::from_millis(5),
        ..UpdatesConfig::default()
    }
}

/// Wraps `SimulatedConnector`, remembering every source it opened and
/// optionally stalling before each open.
pub struct CountingConnector {
    inner: SimulatedConnector,
    open_delay: Duration,
    sources: Mutex<Vec<Arc<SimulatedSource>>>,
}

impl CountingConnector {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_delay(config, Duration::ZERO)
    }

    pub fn with_delay(config: SimulationConfig, open_delay: Duration) -> Self {
        Self {
            inner: SimulatedConnector::new(config),
            open_delay,
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> usize {
        self.inner.opened()
    }

    /// The most recently opened source.
    pub fn last_source(&self) -> Arc<SimulatedSource> {
        self.sources
            .lock()
            .last()
            .cloned()
            .expect("no source has been opened")
    }
}

#[async_trait]
impl SourceConnector for CountingConnector {
    async fn open(
        &self,
        _endpoint: &Endpoint,
        context: Context,
    ) -> Result<Arc<dyn DataSource>, SyncError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let source = self.inner.open_simulated(context);
        self.sources.lock().push(Arc::clone(&source));
        Ok(source)
    }
}

/// TestContext provides a connector over a counting simulated source.
pub struct TestContext {
    pub sources: Arc<CountingConnector>,
    pub connector: Connector,
}

impl TestContext {
    /// Creates a new test context with the fast defaults.
    pub fn new() -> Self {
        Self::with_config(fast_simulation(), fast_updates())
    }

    /// Creates a new test context with custom simulation and update settings.
    pub fn with_config(simulation: SimulationConfig, updates: UpdatesConfig) -> Self {
        init_tracing();
        let sources = Arc::new(CountingConnector::new(simulation));
        let connector = Connector::new(sources.clone(), Handle::current())
            .with_updates(updates)
            .with_connect(ConnectConfig {
                handshake_timeout: Duration::from_secs(2),
            });
        Self { sources, connector }
    }

    /// Connects to mainnet through the default endpoint.
    pub async fn connect(&self) -> Session {
        self.connector
            .connect(ENDPOINT, "mainnet")
            .await
            .expect("connect should succeed")
    }
}

/// Polls `condition` every 5ms until it holds or `timeout` expires.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
