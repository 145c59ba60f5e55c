//! Display-ready projection rows.
//!
//! A [`ViewItem`] is derived output only. The feed engine recomputes it from
//! the transaction, the wallet's block metadata and the cached rate whenever
//! one of those inputs changes; nothing mutates a `ViewItem` in place.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::record::TransactionDirection;
use super::wallet::{CurrencyCode, Wallet};

/// Confirmation state of a transaction for the current chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationState {
    /// Not yet included in a block.
    Pending,
    /// Mined, but fewer than `threshold` blocks deep.
    Confirming { depth: u32, threshold: u32 },
    /// Mined and at least `threshold` blocks deep.
    Confirmed,
}

impl ConfirmationState {
    pub fn is_final(&self) -> bool {
        matches!(self, ConfirmationState::Confirmed)
    }
}

/// Fiat value of a transaction at the time it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiatValue {
    pub currency: CurrencyCode,
    pub rate: Decimal,
    pub value: Decimal,
}

/// One row of the merged transaction feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewItem {
    pub wallet: Wallet,
    pub hash: String,
    pub timestamp: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub date: time::OffsetDateTime,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub direction: TransactionDirection,
    pub block_height: Option<u64>,
    pub confirmation: ConfirmationState,
    /// `None` until a rate for the transaction's timestamp is known.
    pub fiat_value: Option<FiatValue>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
}

/// An entry of the wallet filter offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterOption {
    All,
    Wallet { wallet: Wallet },
}
