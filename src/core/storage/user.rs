// src/core/storage/user.rs

//! Decoded user accounts: the sub-account record with its orders and
//! positions, and the per-authority stats record.

use super::data_types::MarketKind;
use crate::core::addresses::Address;
use crate::core::math::PositionDirection;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Lifecycle of an order slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The slot holds no order.
    #[default]
    Init,
    Open,
    Filled,
    Canceled,
}

/// The kind of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    #[default]
    Limit,
    TriggerMarket,
    TriggerLimit,
    Oracle,
}

/// One order slot of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u32,
    pub market_index: u16,
    pub market_kind: MarketKind,
    #[serde(default)]
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub direction: PositionDirection,
    pub price: u64,
    pub base_asset_amount: u64,
    pub base_asset_amount_filled: u64,
    #[serde(default)]
    pub reduce_only: bool,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// The base amount still waiting to be filled.
    pub fn remaining(&self) -> u64 {
        self.base_asset_amount
            .saturating_sub(self.base_asset_amount_filled)
    }
}

/// A perp position slot. Signed base amounts are long when positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpPosition {
    pub market_index: u16,
    pub base_asset_amount: i64,
    pub quote_asset_amount: i64,
    pub quote_entry_amount: i64,
    #[serde(default)]
    pub open_orders: u8,
}

impl PerpPosition {
    /// An empty slot: no base, no quote and no resting orders.
    pub fn is_available(&self) -> bool {
        self.base_asset_amount == 0 && self.quote_asset_amount == 0 && self.open_orders == 0
    }

    /// A closed position whose quote balance (pnl) is still waiting to be settled.
    pub fn is_unsettled(&self) -> bool {
        self.base_asset_amount == 0 && self.quote_asset_amount != 0
    }

    pub fn direction(&self) -> Option<PositionDirection> {
        match self.base_asset_amount {
            0 => None,
            b if b > 0 => Some(PositionDirection::Long),
            _ => Some(PositionDirection::Short),
        }
    }
}

/// Whether a spot balance is a deposit or a borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SpotBalanceType {
    #[default]
    Deposit,
    Borrow,
}

/// A spot position slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPosition {
    pub market_index: u16,
    pub scaled_balance: u64,
    pub balance_type: SpotBalanceType,
    #[serde(default)]
    pub open_orders: u8,
}

impl SpotPosition {
    pub fn is_available(&self) -> bool {
        self.scaled_balance == 0 && self.open_orders == 0
    }
}

/// A decoded user (sub-)account.
///
/// Order and position vectors mirror the on-chain slot arrays, so they may
/// contain empty slots. The helper methods filter those out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub authority: Address,
    pub sub_account_id: u16,
    pub name: String,
    pub orders: Vec<Order>,
    pub perp_positions: Vec<PerpPosition>,
    pub spot_positions: Vec<SpotPosition>,
}

impl UserAccount {
    /// Orders that are still open.
    pub fn open_orders(&self) -> Vec<Order> {
        self.orders.iter().filter(|o| o.is_open()).copied().collect()
    }

    /// Non-empty perp and spot positions.
    pub fn active_positions(&self) -> (Vec<PerpPosition>, Vec<SpotPosition>) {
        let perp = self
            .perp_positions
            .iter()
            .filter(|p| !p.is_available())
            .copied()
            .collect();
        let spot = self
            .spot_positions
            .iter()
            .filter(|p| !p.is_available())
            .copied()
            .collect();
        (perp, spot)
    }

    pub fn unsettled_positions(&self) -> Vec<PerpPosition> {
        self.perp_positions
            .iter()
            .filter(|p| p.is_unsettled())
            .copied()
            .collect()
    }

    pub fn perp_position(&self, market_index: u16) -> Option<PerpPosition> {
        self.perp_positions
            .iter()
            .find(|p| p.market_index == market_index && !p.is_available())
            .copied()
    }

    pub fn spot_position(&self, market_index: u16) -> Option<SpotPosition> {
        self.spot_positions
            .iter()
            .find(|p| p.market_index == market_index && !p.is_available())
            .copied()
    }
}

/// Aggregate statistics shared by every sub-account of one authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub authority: Address,
    pub number_of_sub_accounts: u16,
    pub taker_volume_30d: u64,
    pub maker_volume_30d: u64,
    pub total_fee_paid: u64,
    #[serde(default)]
    pub if_staked_quote_asset_amount: u64,
}
