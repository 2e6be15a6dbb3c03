// src/core/addresses.rs

//! Deterministic address derivation.
//!
//! Every function here is pure: the same program identity and seed tuple always
//! yield the same address, and distinct seed tuples yield distinct addresses
//! with overwhelming probability. Nothing is cached.

use crate::core::SyncError;
use crate::core::context::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Domain separator appended to every derivation.
const DERIVATION_MARKER: &[u8] = b"ProgramDerivedAddress";

/// A 32-byte account address, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            SyncError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(array))
    }
}

/// Derives an address owned by `program` from an ordered list of seeds.
pub fn derive(program: &Address, seeds: &[&[u8]]) -> Address {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program.as_bytes());
    hasher.update(DERIVATION_MARKER);
    Address(hasher.finalize().into())
}

fn program_of(context: Context) -> &'static Address {
    &context.programs().program_id
}

/// The protocol's global state account.
pub fn state_account(context: Context) -> Address {
    derive(program_of(context), &[b"drift_state"])
}

/// The PDA that signs for protocol-owned vaults.
pub fn drift_signer(context: Context) -> Address {
    derive(program_of(context), &[b"drift_signer"])
}

pub fn perp_market_account(context: Context, market_index: u16) -> Address {
    derive(
        program_of(context),
        &[b"perp_market", &market_index.to_le_bytes()],
    )
}

pub fn spot_market_account(context: Context, market_index: u16) -> Address {
    derive(
        program_of(context),
        &[b"spot_market", &market_index.to_le_bytes()],
    )
}

pub fn spot_market_vault(context: Context, market_index: u16) -> Address {
    derive(
        program_of(context),
        &[b"spot_market_vault", &market_index.to_le_bytes()],
    )
}

/// The user account for `authority` at `sub_account_id`.
pub fn user_account(context: Context, authority: &Address, sub_account_id: u16) -> Address {
    derive(
        program_of(context),
        &[b"user", authority.as_ref(), &sub_account_id.to_le_bytes()],
    )
}

pub fn user_stats_account(context: Context, authority: &Address) -> Address {
    derive(program_of(context), &[b"user_stats", authority.as_ref()])
}

/// The account holding signed (swift) orders for `authority`.
pub fn swift_order_account(context: Context, authority: &Address) -> Address {
    derive(
        program_of(context),
        &[b"SIGNED_MSG_USER_ORDERS", authority.as_ref()],
    )
}

pub fn pyth_lazer_oracle(context: Context, feed_id: u32) -> Address {
    derive(program_of(context), &[b"pyth_lazer", &feed_id.to_le_bytes()])
}

pub fn revenue_share(context: Context, authority: &Address) -> Address {
    derive(program_of(context), &[b"REV_SHARE", authority.as_ref()])
}

pub fn revenue_share_escrow(context: Context, authority: &Address) -> Address {
    derive(program_of(context), &[b"REV_ESCROW", authority.as_ref()])
}
