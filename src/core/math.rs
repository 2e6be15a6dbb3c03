// src/core/math.rs

//! Price and size standardization against tick and step sizes.

use crate::core::SyncError;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The side an order is placed on. Decides which way an off-tick price rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    Long,
    Short,
}

/// Rounds `price` onto the tick grid. Longs round down, shorts round up.
/// A zero price stays zero.
pub fn standardize_price(
    price: u64,
    tick_size: u64,
    direction: PositionDirection,
) -> Result<u64, SyncError> {
    if tick_size == 0 {
        return Err(SyncError::ZeroStepSize);
    }
    if price == 0 {
        return Ok(0);
    }
    let remainder = price % tick_size;
    if remainder == 0 {
        return Ok(price);
    }
    match direction {
        PositionDirection::Long => Ok(price - remainder),
        PositionDirection::Short => (price - remainder)
            .checked_add(tick_size)
            .ok_or(SyncError::Overflow(price)),
    }
}

/// Signed variant of [`standardize_price`]. Uses the Euclidean remainder so
/// negative prices round in the same direction as positive ones.
pub fn standardize_price_i64(
    price: i64,
    tick_size: u64,
    direction: PositionDirection,
) -> Result<i64, SyncError> {
    if tick_size == 0 {
        return Err(SyncError::ZeroStepSize);
    }
    if price == 0 {
        return Ok(0);
    }
    let tick = i64::try_from(tick_size).map_err(|_| SyncError::Overflow(tick_size))?;
    let remainder = price.rem_euclid(tick);
    if remainder == 0 {
        return Ok(price);
    }
    let overflow = SyncError::Overflow(price.unsigned_abs());
    match direction {
        PositionDirection::Long => price.checked_sub(remainder).ok_or(overflow),
        PositionDirection::Short => price.checked_add(tick - remainder).ok_or(overflow),
    }
}

/// Rounds a base asset amount down to a multiple of `step_size`.
pub fn standardize_base_asset_amount(amount: u64, step_size: u64) -> Result<u64, SyncError> {
    if step_size == 0 {
        return Err(SyncError::ZeroStepSize);
    }
    Ok(amount - amount % step_size)
}

/// Rounds a base asset amount up to a multiple of `step_size` whenever there is
/// any remainder at all.
pub fn standardize_base_asset_amount_ceil(amount: u64, step_size: u64) -> Result<u64, SyncError> {
    if step_size == 0 {
        return Err(SyncError::ZeroStepSize);
    }
    let remainder = amount % step_size;
    if remainder == 0 {
        return Ok(amount);
    }
    (amount - remainder)
        .checked_add(step_size)
        .ok_or(SyncError::Overflow(amount))
}
