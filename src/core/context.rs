// src/core/context.rs

//! The closed set of deployment contexts a session can target, and the
//! immutable registry of program identities known for each of them.

use crate::core::SyncError;
use crate::core::addresses::Address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// A named deployment environment. Anything outside this enum is a configuration error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    #[strum(serialize = "mainnet")]
    MainNet,
    #[strum(serialize = "devnet")]
    DevNet,
}

impl Context {
    /// The canonical lowercase name of the context.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Parses a context name, mapping failures to `SyncError::Config`.
    pub fn parse(name: &str) -> Result<Self, SyncError> {
        Context::from_str(name.trim()).map_err(|_| {
            SyncError::Config(format!(
                "Invalid context '{name}', must be 'mainnet' or 'devnet'"
            ))
        })
    }

    /// Returns the static program registry for this context.
    pub fn programs(&self) -> &'static ProgramRegistry {
        // Every variant is inserted when the registry is built.
        &REGISTRY[self]
    }
}

/// Program identities for one context. Immutable after process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRegistry {
    pub program_id: Address,
    pub vault_program_id: Address,
    pub jit_proxy_id: Address,
    pub token_program_id: Address,
    pub token_2022_program_id: Address,
    pub associated_token_program_id: Address,
}

const PROGRAM_ID: &str = "0954dbbe9ec960c98a7a293fe21336966fe180d151ae4b8179561f89854a53f6";
const VAULT_PROGRAM_ID: &str = "0d9efabfd672f11e9f8f39e43325d846e5eba10c0abb63992534f8b4b7830c86";
const JIT_PROXY_ID: &str = "fcb4f5f3e3e229f8dbc0cba7e153e485536d4f6e3ee173b147c98d4ef0f8a87e";
const TOKEN_PROGRAM_ID: &str = "06ddf6e1d765a193d9cbe146ceeb79ac1cb485ed5f5b37913a8cf5857eff00a9";
const TOKEN_2022_PROGRAM_ID: &str =
    "06ddf6e1ee758fde18425dbce46ccddab61afc4d83b90d27febdf928d8a18bfc";
const ASSOCIATED_TOKEN_PROGRAM_ID: &str =
    "8c97258f4e2489f1bb3d1029148e0d830b5a1399daff1084048e7bd8dbe9f859";

fn static_address(hex_str: &str) -> Address {
    Address::from_str(hex_str).expect("static program id must be valid hex")
}

/// The process-wide registry. Both contexts share one deployment of the
/// protocol programs.
static REGISTRY: Lazy<HashMap<Context, ProgramRegistry>> = Lazy::new(|| {
    let shared = ProgramRegistry {
        program_id: static_address(PROGRAM_ID),
        vault_program_id: static_address(VAULT_PROGRAM_ID),
        jit_proxy_id: static_address(JIT_PROXY_ID),
        token_program_id: static_address(TOKEN_PROGRAM_ID),
        token_2022_program_id: static_address(TOKEN_2022_PROGRAM_ID),
        associated_token_program_id: static_address(ASSOCIATED_TOKEN_PROGRAM_ID),
    };
    Context::iter().map(|ctx| (ctx, shared.clone())).collect()
});

/// Perp markets priced by a Pyth Lazer feed, as `(feed_id, perp_market_index)`.
/// Shared by both contexts.
const PYTH_LAZER_FEEDS: &[(u32, u16)] = &[(6, 0), (1, 1), (2, 2)];

static LAZER_FEED_TO_MARKET: Lazy<HashMap<u32, u16>> =
    Lazy::new(|| PYTH_LAZER_FEEDS.iter().copied().collect());

static MARKET_TO_LAZER_FEED: Lazy<HashMap<u16, u32>> = Lazy::new(|| {
    PYTH_LAZER_FEEDS
        .iter()
        .map(|&(feed_id, market_index)| (market_index, feed_id))
        .collect()
});

/// The perp market a Pyth Lazer feed prices, if any.
pub fn pyth_lazer_feed_id_to_perp_market_index(feed_id: u32) -> Option<u16> {
    LAZER_FEED_TO_MARKET.get(&feed_id).copied()
}

/// The Pyth Lazer feed pricing a perp market, if it has one.
pub fn perp_market_index_to_pyth_lazer_feed_id(market_index: u16) -> Option<u32> {
    MARKET_TO_LAZER_FEED.get(&market_index).copied()
}
