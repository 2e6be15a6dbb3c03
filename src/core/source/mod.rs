// src/core/source/mod.rs

//! The seams to the outside world: the remote data source, the connector that
//! opens one for an endpoint, and the decoder that turns raw payloads into
//! typed entities.

pub mod decoder;
pub mod simulated;

use crate::core::SyncError;
use crate::core::context::Context;
use crate::core::storage::{CacheKey, MarketKind, SchemaId};
use crate::core::urls::Endpoint;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use decoder::{Decoder, JsonDecoder};
pub use simulated::{SimulatedConnector, SimulatedSource};

/// An opaque payload for one key, tagged with a non-decreasing sequence
/// marker (a slot) used to discard stale, out-of-order updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpdate {
    pub key: CacheKey,
    pub slot: u64,
    pub payload: Bytes,
}

/// A named feed advertised by a source, with the schema its payloads use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFeed {
    pub name: String,
    pub schema: SchemaId,
}

/// The addressable entity space discovered during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub perp_markets: Vec<u16>,
    pub spot_markets: Vec<u16>,
    pub named_feeds: Vec<NamedFeed>,
}

impl SourceInfo {
    /// Returns the schema for `key`, or `None` if the key is outside the
    /// discovered entity space. Accounts, users and user stats are always
    /// addressable.
    pub fn schema_for(&self, key: &CacheKey) -> Option<SchemaId> {
        match key {
            CacheKey::Market(id) | CacheKey::Oracle(id) => {
                let known = match id.kind {
                    MarketKind::Perp => &self.perp_markets,
                    MarketKind::Spot => &self.spot_markets,
                };
                if known.contains(&id.index) {
                    key.default_schema()
                } else {
                    None
                }
            }
            CacheKey::Account(_) | CacheKey::User(_) | CacheKey::UserStats(_) => {
                key.default_schema()
            }
            CacheKey::Named(name) => self
                .named_feeds
                .iter()
                .find(|feed| &feed.name == name)
                .map(|feed| feed.schema),
        }
    }
}

/// A stream of updates for one subscribed key.
pub type UpdateStream = BoxStream<'static, Result<RawUpdate, SyncError>>;

/// A remote data source. Implementations perform the actual I/O.
///
/// Errors for which `SyncError::is_fatal` is true tell the caller that the key
/// will never be served again; every other error is treated as transient.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Validates the connection and discovers the addressable entity space.
    async fn handshake(&self) -> Result<SourceInfo, SyncError>;

    /// Fetches the current payload for one key.
    async fn fetch(&self, key: &CacheKey) -> Result<RawUpdate, SyncError>;

    /// Opens a push subscription for one key.
    async fn subscribe(&self, key: &CacheKey) -> Result<UpdateStream, SyncError>;
}

/// Opens a `DataSource` for an endpoint. Called once per `connect`.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn open(
        &self,
        endpoint: &Endpoint,
        context: Context,
    ) -> Result<Arc<dyn DataSource>, SyncError>;
}
