// src/main.rs

//! The demo binary: connects to the simulated source, subscribes to every
//! market and oracle, and reads the cache from the synchronous main thread.

use anyhow::{Context as _, Result, anyhow};
use marketsync::config::Config;
use marketsync::core::metrics;
use marketsync::core::runtime::SyncRuntime;
use marketsync::core::source::SimulatedConnector;
use marketsync::{Connector, Selector};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

const DEFAULT_CONFIG_PATH: &str = "marketsync.toml";

fn main() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("marketsync version {VERSION}");
        return Ok(());
    }

    let config_path = flag_value(&args, "--config").unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config = if Path::new(config_path).exists() {
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    if let Some(context) = flag_value(&args, "--context") {
        config.context = context.to_string();
    }
    if let Some(endpoint) = flag_value(&args, "--endpoint") {
        config.endpoint = endpoint.to_string();
    }
    let duration = match flag_value(&args, "--duration") {
        Some(secs) => Duration::from_secs(
            secs.parse::<u64>()
                .map_err(|_| anyhow!("Invalid --duration value: {secs}"))?,
        ),
        None => Duration::from_secs(5),
    };

    // Get initial log level from env var or config.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = run(&config, duration, args.contains(&"--metrics".to_string())) {
        error!("marketsync error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(config: &Config, duration: Duration, print_metrics: bool) -> Result<()> {
    let runtime = SyncRuntime::new(&config.runtime).context("Failed to start runtime")?;
    let source = Arc::new(SimulatedConnector::new(config.simulation.clone()));
    let connector = Connector::from_config(source, runtime.handle(), config);

    let session = {
        let connector = connector.clone();
        let endpoint = config.endpoint.clone();
        let context = config.context.clone();
        runtime
            .submit(async move { connector.connect(&endpoint, &context).await })
            .wait()??
    };
    let session = Arc::new(session);
    info!("{}", session);

    let subscribing = Arc::clone(&session);
    let report = runtime
        .submit(async move { subscribing.subscribe(Selector::All).await })
        .wait()??;
    info!("Subscribed to {} key(s).", report.total());

    // Reads never touch the runtime: they go straight to the cache.
    let started = Instant::now();
    while started.elapsed() < duration {
        thread::sleep(Duration::from_secs(1));
        let reader = session.reader();
        for index in session.perp_market_indices().iter().take(3) {
            match reader.perp_oracle(*index) {
                Some(oracle) => info!(
                    "perp {} oracle price={} confidence={} slot={}",
                    index, oracle.price, oracle.confidence, oracle.slot
                ),
                None => warn!("perp {} oracle not cached yet", index),
            }
        }
        let stats = session.stats();
        info!(
            "cached={} applied={} stale={} fetch_errors={} decode_errors={}",
            reader.len(),
            stats.applied,
            stats.stale,
            stats.fetch_errors,
            stats.decode_errors
        );
    }

    let closing = Arc::clone(&session);
    runtime
        .submit(async move { closing.shutdown().await })
        .wait()?;

    if print_metrics {
        println!("{}", metrics::gather());
    }

    drop(session);
    runtime.shutdown(Duration::from_secs(5));
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
