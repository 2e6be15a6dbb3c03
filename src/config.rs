// src/config.rs

//! Manages client configuration: loading from TOML, defaults, and validation.

use crate::core::SyncError;
use crate::core::context::Context;
use anyhow::{Context as _, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// How update tasks obtain fresh values from the data source.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateModeKind {
    /// Fetch every key on a fixed interval.
    #[default]
    Poll,
    /// Hold one push subscription per key.
    Stream,
}

/// Settings for the tokio runtime backing sessions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
        }
    }
}

fn default_worker_threads() -> usize {
    2
}
fn default_thread_name() -> String {
    "marketsync-worker".to_string()
}

/// Settings for session establishment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    /// Upper bound on opening the source and completing its handshake.
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

impl ConnectConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.handshake_timeout.is_zero() {
            return Err(SyncError::Config(
                "connect.handshake_timeout cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Settings shared by every update task of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UpdatesConfig {
    #[serde(default)]
    pub mode: UpdateModeKind,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Consecutive recoverable failures after which a task gives up. `0` never gives up.
    #[serde(default)]
    pub max_consecutive_failures: u32,
    #[serde(with = "humantime_serde", default = "default_resubscribe_backoff")]
    pub resubscribe_backoff: Duration,
    /// Consecutive stream re-opens before a stream task gives up.
    #[serde(default = "default_max_resubscribe_attempts")]
    pub max_resubscribe_attempts: u32,
    #[serde(default = "default_fault_channel_capacity")]
    pub fault_channel_capacity: usize,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            mode: UpdateModeKind::default(),
            poll_interval: default_poll_interval(),
            max_consecutive_failures: 0,
            resubscribe_backoff: default_resubscribe_backoff(),
            max_resubscribe_attempts: default_max_resubscribe_attempts(),
            fault_channel_capacity: default_fault_channel_capacity(),
        }
    }
}

impl UpdatesConfig {
    /// Checks the settings every update task relies on. The connector runs this
    /// too, so settings that never went through `Config` are covered.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config(
                "updates.poll_interval cannot be 0".to_string(),
            ));
        }
        if self.fault_channel_capacity == 0 {
            return Err(SyncError::Config(
                "updates.fault_channel_capacity cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(400)
}
fn default_resubscribe_backoff() -> Duration {
    Duration::from_millis(500)
}
fn default_max_resubscribe_attempts() -> u32 {
    5
}
fn default_fault_channel_capacity() -> usize {
    256
}

/// Shape of the synthetic feed served by the simulated source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    #[serde(default = "default_perp_markets")]
    pub perp_markets: u16,
    #[serde(default = "default_spot_markets")]
    pub spot_markets: u16,
    /// Interval between pushed updates in stream mode.
    #[serde(with = "humantime_serde", default = "default_tick")]
    pub tick: Duration,
    /// Artificial delay added to every fetch.
    #[serde(with = "humantime_serde", default)]
    pub latency: Duration,
    /// Every Nth payload of a key is undecodable. `0` disables corruption.
    #[serde(default)]
    pub corrupt_every: u64,
    /// Keys (in their display form, e.g. `perp_oracle:3`) the source refuses permanently.
    #[serde(default)]
    pub unavailable: Vec<String>,
    #[serde(default)]
    pub fail_handshake: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            perp_markets: default_perp_markets(),
            spot_markets: default_spot_markets(),
            tick: default_tick(),
            latency: Duration::ZERO,
            corrupt_every: 0,
            unavailable: Vec::new(),
            fail_handshake: false,
            seed: default_seed(),
        }
    }
}

fn default_perp_markets() -> u16 {
    8
}
fn default_spot_markets() -> u16 {
    4
}
fn default_tick() -> Duration {
    Duration::from_millis(100)
}
fn default_seed() -> u64 {
    42
}

/// The main configuration structure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub connect: ConnectConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_context() -> String {
    "mainnet".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            endpoint: default_endpoint(),
            context: default_context(),
            runtime: RuntimeConfig::default(),
            connect: ConnectConfig::default(),
            updates: UpdatesConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint cannot be empty"));
        }
        Context::parse(&self.context).map_err(|e| anyhow!("{e}"))?;
        if self.runtime.worker_threads == 0 {
            return Err(anyhow!("runtime.worker_threads cannot be 0"));
        }
        self.connect.validate().map_err(|e| anyhow!("{e}"))?;
        self.updates.validate().map_err(|e| anyhow!("{e}"))?;
        if self.updates.mode == UpdateModeKind::Stream && self.simulation.tick.is_zero() {
            return Err(anyhow!("simulation.tick cannot be 0 in stream mode"));
        }

        if self.updates.poll_interval < Duration::from_millis(10) {
            warn!(
                "very short poll_interval {:?}; this may flood the data source",
                self.updates.poll_interval
            );
        }
        Ok(())
    }
}
