//! Runtime configuration of the feed.

use std::time::Duration;
use txfeed_sdk::objects::{CurrencyCode, Wallet};

use crate::aggregator::DEFAULT_PAGE_SIZE;

/// How long a page fetch may take before it is reported as failed.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One configured wallet with the metadata known when it was configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    pub wallet: Wallet,
    /// Blocks needed before a transaction counts as confirmed.
    pub confirmation_threshold: u32,
    /// Chain tip known at configuration time, if any.
    pub last_block_height: Option<u64>,
}

/// The feed configuration watched by the orchestrator.
///
/// Changing `wallets` or `page_size` resets the feed; changing
/// `base_currency` invalidates every cached rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub wallets: Vec<WalletConfig>,
    pub base_currency: CurrencyCode,
    pub page_size: usize,
    pub fetch_timeout: Duration,
}

impl FeedConfig {
    pub fn new(wallets: Vec<WalletConfig>, base_currency: CurrencyCode) -> Self {
        Self {
            wallets,
            base_currency,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn wallet_keys(&self) -> Vec<Wallet> {
        self.wallets.iter().map(|w| w.wallet.clone()).collect()
    }

    pub fn contains(&self, wallet: &Wallet) -> bool {
        self.wallets.iter().any(|w| &w.wallet == wallet)
    }
}
