// src/core/source/simulated.rs

//! A deterministic, in-process data source that synthesizes market, oracle,
//! account and counter payloads. It lets the whole pipeline run without a
//! network and gives tests precise control over failures.

use super::{DataSource, NamedFeed, RawUpdate, SourceConnector, SourceInfo, UpdateStream};
use crate::config::SimulationConfig;
use crate::core::SyncError;
use crate::core::context::Context;
use crate::core::addresses::Address;
use crate::core::math::PositionDirection;
use crate::core::storage::{
    AccountSnapshot, CacheKey, MarketId, MarketKind, MarketStatus, OraclePriceData, Order,
    OrderStatus, OrderType, PerpMarket, PerpPosition, SchemaId, SpotBalanceType, SpotMarket,
    SpotPosition, UserAccount, UserStats,
};
use crate::core::urls::Endpoint;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

/// The name of the demo feed whose value equals its own slot.
pub const COUNTER_FEED: &str = "counter";

const CORRUPT_PAYLOAD: &[u8] = b"\xff\xfenot-json";

const USER_PERP_SLOTS: usize = 8;
const USER_SPOT_SLOTS: usize = 8;

const EMPTY_PERP_POSITION: PerpPosition = PerpPosition {
    market_index: 0,
    base_asset_amount: 0,
    quote_asset_amount: 0,
    quote_entry_amount: 0,
    open_orders: 0,
};

const EMPTY_SPOT_POSITION: SpotPosition = SpotPosition {
    market_index: 0,
    scaled_balance: 0,
    balance_type: SpotBalanceType::Deposit,
    open_orders: 0,
};

/// Opens one independent `SimulatedSource` per call.
#[derive(Debug, Default)]
pub struct SimulatedConnector {
    config: SimulationConfig,
    opened: AtomicUsize,
}

impl SimulatedConnector {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            opened: AtomicUsize::new(0),
        }
    }

    /// Opens a source and keeps the concrete type, for callers that want to
    /// inspect it (e.g. `fetch_count`).
    pub fn open_simulated(&self, context: Context) -> Arc<SimulatedSource> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        Arc::new(SimulatedSource::new(context, self.config.clone()))
    }

    /// How many sources this connector has opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceConnector for SimulatedConnector {
    async fn open(
        &self,
        endpoint: &Endpoint,
        context: Context,
    ) -> Result<Arc<dyn DataSource>, SyncError> {
        debug!("Opening simulated source for {} ({})", endpoint.http, context);
        Ok(self.open_simulated(context))
    }
}

/// A synthetic feed. Every fetch of a key advances that key's slot by one.
#[derive(Debug)]
pub struct SimulatedSource {
    inner: Arc<SourceInner>,
}

#[derive(Debug)]
struct SourceInner {
    context: Context,
    config: SimulationConfig,
    info: SourceInfo,
    slots: DashMap<CacheKey, u64>,
    prices: DashMap<MarketId, i64>,
    rng: Mutex<SmallRng>,
    fetches: AtomicU64,
}

impl SimulatedSource {
    pub fn new(context: Context, config: SimulationConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        let info = SourceInfo {
            perp_markets: (0..config.perp_markets).collect(),
            spot_markets: (0..config.spot_markets).collect(),
            named_feeds: vec![NamedFeed {
                name: COUNTER_FEED.to_string(),
                schema: SchemaId::Counter,
            }],
        };
        Self {
            inner: Arc::new(SourceInner {
                context,
                config,
                info,
                slots: DashMap::new(),
                prices: DashMap::new(),
                rng: Mutex::new(rng),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Total number of payloads produced, across fetches and streams.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    /// The latest slot produced for `key`, or 0 if never served.
    pub fn slot_of(&self, key: &CacheKey) -> u64 {
        self.inner.slots.get(key).map(|s| *s).unwrap_or(0)
    }

    pub fn context(&self) -> Context {
        self.inner.context
    }
}

impl SourceInner {
    /// Fails for keys outside the served space or configured as unavailable.
    fn check_served(&self, key: &CacheKey) -> Result<(), SyncError> {
        let rendered = key.to_string();
        if self.config.unavailable.iter().any(|k| *k == rendered) {
            return Err(SyncError::SourceUnavailable {
                key: rendered,
                reason: "key is permanently unavailable".to_string(),
            });
        }
        if self.info.schema_for(key).is_none() {
            return Err(SyncError::SourceUnavailable {
                key: rendered,
                reason: "key is not served by this source".to_string(),
            });
        }
        Ok(())
    }

    fn next_slot(&self, key: &CacheKey) -> u64 {
        let mut slot = self.slots.entry(key.clone()).or_insert(0);
        *slot += 1;
        *slot
    }

    fn next_update(&self, key: &CacheKey) -> Result<RawUpdate, SyncError> {
        self.check_served(key)?;
        let slot = self.next_slot(key);
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let corrupt_every = self.config.corrupt_every;
        let payload = if corrupt_every > 0 && slot % corrupt_every == 0 {
            Bytes::from_static(CORRUPT_PAYLOAD)
        } else {
            Bytes::from(self.render(key, slot)?)
        };

        Ok(RawUpdate {
            key: key.clone(),
            slot,
            payload,
        })
    }

    fn render(&self, key: &CacheKey, slot: u64) -> Result<Vec<u8>, SyncError> {
        let json = match key {
            CacheKey::Market(MarketId {
                kind: MarketKind::Perp,
                index,
            }) => serde_json::to_vec(&self.perp_market(*index, slot))?,
            CacheKey::Market(MarketId {
                kind: MarketKind::Spot,
                index,
            }) => serde_json::to_vec(&self.spot_market(*index, slot))?,
            CacheKey::Oracle(id) => serde_json::to_vec(&self.oracle(*id, slot))?,
            CacheKey::Account(address) => serde_json::to_vec(&AccountSnapshot {
                address: *address,
                owner: self.context.programs().program_id,
                lamports: 1_000_000 + slot,
                data: Bytes::copy_from_slice(&slot.to_le_bytes()),
            })?,
            CacheKey::User(address) => serde_json::to_vec(&self.user_account(address, slot))?,
            CacheKey::UserStats(authority) => {
                serde_json::to_vec(&self.user_stats(authority, slot))?
            }
            CacheKey::Named(_) => serde_json::to_vec(&slot)?,
        };
        Ok(json)
    }

    fn perp_market(&self, index: u16, slot: u64) -> PerpMarket {
        let base = 1_000_000_000 + u64::from(index) * 1_000_000;
        // Funding oscillates within +/- 1000 as the slot advances.
        let funding = ((slot as i64 * 7919 + i64::from(index)) % 2001) - 1000;
        PerpMarket {
            market_index: index,
            name: format!("PERP-{index}"),
            status: MarketStatus::Active,
            amm_base_asset_reserve: base,
            amm_quote_asset_reserve: base,
            amm_peg_multiplier: (u64::from(index) + 1) * 1_000_000,
            amm_last_funding_rate: funding,
            order_tick_size: 100,
            order_step_size: 1_000,
        }
    }

    fn spot_market(&self, index: u16, slot: u64) -> SpotMarket {
        SpotMarket {
            market_index: index,
            name: if index == 0 {
                "USDC".to_string()
            } else {
                format!("SPOT-{index}")
            },
            status: MarketStatus::Active,
            decimals: if index == 0 { 6 } else { 9 },
            deposit_balance: 1_000_000 + slot * 10,
            borrow_balance: 500_000 + slot * 3,
            order_tick_size: 100,
            order_step_size: 1_000,
        }
    }

    /// A sub-account with a growing long on perp 0, a closed but unsettled
    /// perp 1, a USDC deposit, one open and one filled order, and empty slots
    /// behind them.
    fn user_account(&self, address: &Address, slot: u64) -> UserAccount {
        let size = 1_000 * slot as i64;
        let mut perp_positions = vec![
            PerpPosition {
                market_index: 0,
                base_asset_amount: size,
                quote_asset_amount: -size * 100,
                quote_entry_amount: -size * 100,
                open_orders: 1,
            },
            PerpPosition {
                market_index: 1,
                base_asset_amount: 0,
                quote_asset_amount: 2_500,
                quote_entry_amount: 0,
                open_orders: 0,
            },
        ];
        perp_positions.resize(USER_PERP_SLOTS, EMPTY_PERP_POSITION);

        let mut spot_positions = vec![SpotPosition {
            market_index: 0,
            scaled_balance: 1_000_000 + slot,
            balance_type: SpotBalanceType::Deposit,
            open_orders: 0,
        }];
        spot_positions.resize(USER_SPOT_SLOTS, EMPTY_SPOT_POSITION);

        let orders = vec![
            Order {
                order_id: slot as u32 * 2,
                market_index: 0,
                market_kind: MarketKind::Perp,
                order_type: OrderType::Limit,
                status: OrderStatus::Open,
                direction: PositionDirection::Long,
                price: 99_000,
                base_asset_amount: 5_000,
                base_asset_amount_filled: 0,
                reduce_only: false,
            },
            Order {
                order_id: slot as u32 * 2 + 1,
                market_index: 0,
                market_kind: MarketKind::Perp,
                order_type: OrderType::Market,
                status: OrderStatus::Filled,
                direction: PositionDirection::Long,
                price: 0,
                base_asset_amount: 1_000,
                base_asset_amount_filled: 1_000,
                reduce_only: false,
            },
        ];

        UserAccount {
            // The simulator keeps no authority registry; accounts are their own authority.
            authority: *address,
            sub_account_id: 0,
            name: "Main Account".to_string(),
            orders,
            perp_positions,
            spot_positions,
        }
    }

    fn user_stats(&self, authority: &Address, slot: u64) -> UserStats {
        UserStats {
            authority: *authority,
            number_of_sub_accounts: 1,
            taker_volume_30d: slot * 1_000,
            maker_volume_30d: slot * 400,
            total_fee_paid: slot * 3,
            if_staked_quote_asset_amount: 0,
        }
    }

    fn oracle(&self, id: MarketId, slot: u64) -> OraclePriceData {
        let (step, confidence, delay) = {
            let mut rng = self.rng.lock();
            (
                rng.gen_range(-50_000i64..=50_000),
                rng.gen_range(1_000u64..10_000),
                rng.gen_range(0i64..3),
            )
        };
        let start = (i64::from(id.index) + 1) * 100_000_000;
        let mut price = self.prices.entry(id).or_insert(start);
        *price = (*price + step).max(1);
        OraclePriceData {
            price: *price,
            confidence,
            delay,
            slot,
        }
    }
}

#[async_trait]
impl DataSource for SimulatedSource {
    async fn handshake(&self) -> Result<SourceInfo, SyncError> {
        if self.inner.config.fail_handshake {
            return Err(SyncError::Connect(
                "simulated source rejected the handshake".to_string(),
            ));
        }
        Ok(self.inner.info.clone())
    }

    async fn fetch(&self, key: &CacheKey) -> Result<RawUpdate, SyncError> {
        let latency = self.inner.config.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.inner.next_update(key)
    }

    async fn subscribe(&self, key: &CacheKey) -> Result<UpdateStream, SyncError> {
        self.inner.check_served(key)?;

        let mut ticker = interval(self.inner.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let stream = IntervalStream::new(ticker).map(move |_| inner.next_update(&key));
        Ok(stream.boxed())
    }
}
