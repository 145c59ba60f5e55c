//! Event type definitions for the feed.
//!
//! [`FeedEvent`]s flow from the sync engines, the rate service and the UI
//! into the orchestrator. [`FeedUpdate`]s flow out of it to the display
//! boundary and only ever carry immutable snapshots.

use rust_decimal::Decimal;
use std::sync::Arc;
use txfeed_sdk::objects::{
    AssetCode, CurrencyCode, FilterOption, TransactionRecord, ViewItem, Wallet,
};

/// Input events of the feed orchestrator.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The user scrolled to the bottom and wants the next page.
    LoadNext,
    /// Restrict the feed to one wallet, or show all wallets with `None`.
    SelectWallet(Option<Wallet>),
    /// A wallet's sync engine inserted or amended records.
    RecordsChanged {
        wallet: Wallet,
        records: Vec<TransactionRecord>,
    },
    /// A wallet's sync engine observed a new chain tip.
    ChainTipChanged { wallet: Wallet, height: u64 },
    /// A historical rate became known.
    RateResolved {
        asset: AssetCode,
        currency: CurrencyCode,
        timestamp: i64,
        rate: Decimal,
    },
    /// Network connectivity came back after an outage.
    ConnectivityRestored,
    /// The feed became visible again and should be re-derived.
    Refresh,
    /// The user tapped the row at this index.
    SelectItem(usize),
}

/// How the projection differs from the previously emitted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionChange {
    /// The dataset was reset; previous rows are gone.
    Reset,
    /// A page fetch started; rows are unchanged.
    Loading,
    /// `count` rows were appended starting at `from`.
    Appended { from: usize, count: usize },
    /// Only the rows at these indexes were re-derived.
    Patched { indexes: Vec<usize> },
    /// Every row was re-derived; positions may have shifted.
    Rebuilt,
}

/// An immutable snapshot of the feed as shown to the user.
#[derive(Debug, Clone)]
pub struct Projection {
    pub items: Arc<[ViewItem]>,
    pub change: ProjectionChange,
    /// A page fetch is in flight.
    pub loading: bool,
    /// Every selected wallet is exhausted and nothing is staged.
    pub all_shown: bool,
}

impl Projection {
    /// Nothing to show and nothing on the way.
    pub fn is_empty_result(&self) -> bool {
        self.items.is_empty() && !self.loading
    }
}

/// Output of the feed orchestrator towards the display boundary.
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    Projection(Projection),
    /// Wallet filter entries; empty when there is nothing to choose from.
    FilterOptions(Vec<FilterOption>),
    /// Open the detail screen for this row.
    OpenDetail(ViewItem),
    /// Loading a page failed. The loader is idle again, which clears the
    /// `loading` flag of the last projection, and a new
    /// [`FeedEvent::LoadNext`] retries.
    FetchFailed { reason: String },
}
