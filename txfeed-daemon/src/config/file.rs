//! TOML file configuration structures.
//!
//! These structs directly map to the `txfeed.toml` file format.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use txfeed_core::aggregator::DEFAULT_PAGE_SIZE;
use txfeed_core::cache::DEFAULT_CONFIRMATION_THRESHOLD;
use txfeed_core::config::DEFAULT_FETCH_TIMEOUT;
use txfeed_sdk::objects::{AssetCode, CurrencyCode};
use uuid::Uuid;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub feed: FeedSection,
    #[serde(default)]
    pub wallets: Vec<WalletEntry>,
    #[serde(default)]
    pub rates: Vec<RateEntry>,
}

/// Feed configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    /// Fiat currency the feed values transactions in (e.g. "USD").
    pub base_currency: CurrencyCode,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

/// One wallet whose history is replayed from a JSON fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub account_id: Uuid,
    pub asset: AssetCode,
    #[serde(default = "default_confirmation_threshold")]
    pub confirmation_threshold: u32,
    #[serde(default)]
    pub last_block_height: Option<u64>,
    /// JSON array of transaction records. Relative paths are resolved
    /// against the directory of the config file.
    pub fixture: PathBuf,
}

fn default_confirmation_threshold() -> u32 {
    DEFAULT_CONFIRMATION_THRESHOLD
}

/// A fixed historical rate, valid for every timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateEntry {
    pub asset: AssetCode,
    pub currency: CurrencyCode,
    pub value: Decimal,
}
