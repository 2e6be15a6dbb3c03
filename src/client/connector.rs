// src/client/connector.rs

//! Defines `Connector`, which turns an endpoint and a context name into a
//! ready `Session`.

use crate::config::{Config, ConnectConfig, UpdatesConfig};
use crate::core::SyncError;
use crate::core::context::Context;
use crate::core::source::{Decoder, JsonDecoder, SourceConnector};
use crate::core::urls::Endpoint;
use crate::session::Session;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Establishes sessions. Holds only immutable state, so one connector can
/// serve any number of concurrent `connect` calls.
#[derive(Clone)]
pub struct Connector {
    source: Arc<dyn SourceConnector>,
    decoder: Arc<dyn Decoder>,
    handle: Handle,
    connect: ConnectConfig,
    updates: UpdatesConfig,
}

impl Connector {
    /// Creates a connector with default settings whose sessions run their
    /// tasks on `handle`.
    pub fn new(source: Arc<dyn SourceConnector>, handle: Handle) -> Self {
        Self {
            source,
            decoder: Arc::new(JsonDecoder),
            handle,
            connect: ConnectConfig::default(),
            updates: UpdatesConfig::default(),
        }
    }

    pub fn from_config(source: Arc<dyn SourceConnector>, handle: Handle, config: &Config) -> Self {
        Self::new(source, handle)
            .with_connect(config.connect.clone())
            .with_updates(config.updates.clone())
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_connect(mut self, connect: ConnectConfig) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_updates(mut self, updates: UpdatesConfig) -> Self {
        self.updates = updates;
        self
    }

    /// Validates the context and endpoint, opens the source and completes its
    /// handshake.
    ///
    /// An unknown context, a malformed endpoint or invalid connect/update
    /// settings fail with `SyncError::Config` before any connection is attempted. Transport,
    /// handshake and timeout failures are reported as `SyncError::Connect`.
    pub async fn connect(&self, endpoint: &str, context: &str) -> Result<Session, SyncError> {
        let context = Context::parse(context)?;
        let endpoint = Endpoint::parse(endpoint)?;
        self.connect.validate()?;
        self.updates.validate()?;

        let timeout = self.connect.handshake_timeout;
        let handshake = async {
            let source = self.source.open(&endpoint, context).await?;
            let info = source.handshake().await?;
            Ok::<_, SyncError>((source, info))
        };

        let (source, info) = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                warn!("Connecting to {} failed: {}", endpoint.http, e);
                return Err(into_connect_error(e));
            }
            Err(_) => {
                warn!("Handshake with {} timed out.", endpoint.http);
                return Err(SyncError::Connect(format!(
                    "handshake with {} timed out after {:?}",
                    endpoint.http, timeout
                )));
            }
        };

        info!(
            "Connected to {} ({}): {} perp market(s), {} spot market(s).",
            endpoint.http,
            context,
            info.perp_markets.len(),
            info.spot_markets.len()
        );
        Ok(Session::new(
            context,
            endpoint,
            info,
            source,
            Arc::clone(&self.decoder),
            self.handle.clone(),
            &self.updates,
        ))
    }
}

fn into_connect_error(e: SyncError) -> SyncError {
    match e {
        SyncError::Connect(_) => e,
        other => SyncError::Connect(other.to_string()),
    }
}
