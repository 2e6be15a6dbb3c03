// tests/integration/connect_test.rs

//! Session establishment: validation order, handshake failures and timeouts.

use super::test_helpers::{CountingConnector, ENDPOINT, fast_simulation, init_tracing};
use marketsync::config::{ConnectConfig, SimulationConfig, UpdatesConfig};
use marketsync::{Connector, Context, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn connector_over(sources: &Arc<CountingConnector>) -> Connector {
    init_tracing();
    Connector::new(sources.clone(), Handle::current())
}

#[tokio::test]
async fn test_invalid_context_fails_before_any_io() {
    let sources = Arc::new(CountingConnector::new(fast_simulation()));
    let connector = connector_over(&sources);

    let err = connector.connect(ENDPOINT, "invalid").await.unwrap_err();
    assert!(err.is_config());
    assert_eq!(
        err,
        SyncError::Config("Invalid context 'invalid', must be 'mainnet' or 'devnet'".to_string())
    );
    assert_eq!(sources.opened(), 0);
}

#[tokio::test]
async fn test_malformed_endpoint_is_config_error() {
    let sources = Arc::new(CountingConnector::new(fast_simulation()));
    let connector = connector_over(&sources);

    for endpoint in ["", "not a url", "ftp://example.com", "unix:/tmp/socket"] {
        let err = connector.connect(endpoint, "mainnet").await.unwrap_err();
        assert!(err.is_config(), "{endpoint:?} gave {err:?}");
    }
    assert_eq!(sources.opened(), 0);
}

#[tokio::test]
async fn test_context_is_case_insensitive() {
    let sources = Arc::new(CountingConnector::new(fast_simulation()));
    let connector = connector_over(&sources);

    let session = connector.connect(ENDPOINT, "DevNet").await.unwrap();
    assert_eq!(session.context(), Context::DevNet);
    assert_eq!(session.context_name(), "devnet");
    assert_eq!(sources.opened(), 1);
}

#[tokio::test]
async fn test_websocket_endpoint_is_accepted() {
    let sources = Arc::new(CountingConnector::new(fast_simulation()));
    let connector = connector_over(&sources);

    let session = connector
        .connect("wss://rpc.example.com/path", "mainnet")
        .await
        .unwrap();
    assert_eq!(session.endpoint().http.as_str(), "https://rpc.example.com/path");
    assert_eq!(session.endpoint().ws.as_str(), "wss://rpc.example.com/path");
}

#[tokio::test]
async fn test_rejected_handshake_is_connect_error() {
    let simulation = SimulationConfig {
        fail_handshake: true,
        ..fast_simulation()
    };
    let sources = Arc::new(CountingConnector::new(simulation));
    let connector = connector_over(&sources);

    let err = connector.connect(ENDPOINT, "mainnet").await.unwrap_err();
    assert!(err.is_connect());
    assert_eq!(sources.opened(), 1);
}

#[tokio::test]
async fn test_slow_handshake_times_out() {
    let sources = Arc::new(CountingConnector::with_delay(
        fast_simulation(),
        Duration::from_millis(500),
    ));
    let connector = connector_over(&sources).with_connect(ConnectConfig {
        handshake_timeout: Duration::from_millis(50),
    });

    let err = connector.connect(ENDPOINT, "mainnet").await.unwrap_err();
    match err {
        SyncError::Connect(msg) => assert!(msg.contains("timed out"), "{msg}"),
        other => panic!("expected a connect error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_connects_share_one_connector() {
    let sources = Arc::new(CountingConnector::new(fast_simulation()));
    let connector = connector_over(&sources);

    let (a, b) = tokio::join!(
        connector.connect(ENDPOINT, "mainnet"),
        connector.connect(ENDPOINT, "devnet")
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id(), b.id());
    assert_eq!(a.context(), Context::MainNet);
    assert_eq!(b.context(), Context::DevNet);
    assert_eq!(sources.opened(), 2);
}

#[tokio::test]
async fn test_invalid_update_settings_fail_before_any_io() {
    let sources = Arc::new(CountingConnector::new(fast_simulation()));
    let zero_poll = UpdatesConfig {
        poll_interval: Duration::ZERO,
        ..UpdatesConfig::default()
    };
    let connector = connector_over(&sources).with_updates(zero_poll);

    let err = connector.connect(ENDPOINT, "mainnet").await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Config("updates.poll_interval cannot be 0".to_string())
    );

    let connector = connector_over(&sources).with_connect(ConnectConfig {
        handshake_timeout: Duration::ZERO,
    });
    assert!(connector.connect(ENDPOINT, "mainnet").await.unwrap_err().is_config());
    assert_eq!(sources.opened(), 0);
}
