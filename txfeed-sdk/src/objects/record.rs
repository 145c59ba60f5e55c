//! Transaction records as produced by a wallet's sync engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of value movement relative to the owning wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Incoming,
    Outgoing,
    SentToSelf,
}

/// A single transaction of one wallet.
///
/// `hash` is unique within a wallet. A later event may deliver an amended
/// record with the same hash (for instance once a pending transaction is
/// mined); the amended record replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub fee: Option<Decimal>,
    /// Height of the block that includes the transaction, if mined.
    #[serde(default)]
    pub block_height: Option<u64>,
    pub direction: TransactionDirection,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_address: Option<String>,
}
