// src/core/source/decoder.rs

use super::RawUpdate;
use crate::core::SyncError;
use crate::core::addresses::Address;
use crate::core::storage::{CacheKey, Entity, MarketId, MarketKind, SchemaId};
use serde::de::DeserializeOwned;

/// Turns a raw payload into a typed entity.
pub trait Decoder: Send + Sync {
    fn decode(&self, update: &RawUpdate, schema: SchemaId) -> Result<Entity, SyncError>;
}

/// Decodes JSON payloads with `serde_json`. `Raw` payloads pass through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl JsonDecoder {
    fn parse<T: DeserializeOwned>(update: &RawUpdate) -> Result<T, SyncError> {
        serde_json::from_slice(&update.payload).map_err(|e| SyncError::Decode {
            key: update.key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Rejects a market record whose index disagrees with the key it arrived on.
    fn check_market(update: &RawUpdate, kind: MarketKind, index: u16) -> Result<(), SyncError> {
        match &update.key {
            CacheKey::Market(MarketId { kind: k, index: i }) if *k != kind || *i != index => {
                Err(SyncError::Decode {
                    key: update.key.to_string(),
                    reason: format!("payload describes {kind} market {index}"),
                })
            }
            _ => Ok(()),
        }
    }

    /// Rejects a stats record for a different authority than its key names.
    fn check_authority(update: &RawUpdate, authority: &Address) -> Result<(), SyncError> {
        match &update.key {
            CacheKey::UserStats(expected) if expected != authority => Err(SyncError::Decode {
                key: update.key.to_string(),
                reason: format!("payload belongs to authority {authority}"),
            }),
            _ => Ok(()),
        }
    }
}

impl Decoder for JsonDecoder {
    fn decode(&self, update: &RawUpdate, schema: SchemaId) -> Result<Entity, SyncError> {
        match schema {
            SchemaId::PerpMarket => {
                let market: crate::core::storage::PerpMarket = Self::parse(update)?;
                Self::check_market(update, MarketKind::Perp, market.market_index)?;
                Ok(Entity::PerpMarket(market))
            }
            SchemaId::SpotMarket => {
                let market: crate::core::storage::SpotMarket = Self::parse(update)?;
                Self::check_market(update, MarketKind::Spot, market.market_index)?;
                Ok(Entity::SpotMarket(market))
            }
            SchemaId::Oracle => Self::parse(update).map(Entity::Oracle),
            SchemaId::Account => Self::parse(update).map(Entity::Account),
            SchemaId::User => Self::parse(update).map(Entity::User),
            SchemaId::UserStats => {
                let stats: crate::core::storage::UserStats = Self::parse(update)?;
                Self::check_authority(update, &stats.authority)?;
                Ok(Entity::UserStats(stats))
            }
            SchemaId::Counter => Self::parse(update).map(Entity::Counter),
            SchemaId::Raw => Ok(Entity::Raw(update.payload.clone())),
        }
    }
}
