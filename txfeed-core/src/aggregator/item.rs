use std::cmp::Ordering;
use txfeed_sdk::objects::{TransactionRecord, Wallet};

/// A transaction record scoped to the wallet that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionItem {
    pub wallet: Wallet,
    pub record: TransactionRecord,
}

impl TransactionItem {
    pub fn new(wallet: Wallet, record: TransactionRecord) -> Self {
        Self { wallet, record }
    }

    /// Position of `self` relative to `other` in the feed.
    ///
    /// Newest first. Equal timestamps fall back to the hash and then the
    /// wallet key so repeated merges of the same inputs produce the same
    /// order. `Ordering::Less` means `self` is shown above `other`.
    pub fn feed_order(&self, other: &Self) -> Ordering {
        other
            .record
            .timestamp
            .cmp(&self.record.timestamp)
            .then_with(|| self.record.hash.cmp(&other.record.hash))
            .then_with(|| self.wallet.cmp(&other.wallet))
    }

    pub fn shown_before(&self, other: &Self) -> bool {
        self.feed_order(other) == Ordering::Less
    }
}

/// What the aggregator still needs from one wallet to extend the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub wallet: Wallet,
    /// Hash of the last record received from this wallet; `None` requests
    /// the newest records.
    pub from_hash: Option<String>,
    pub limit: usize,
}
