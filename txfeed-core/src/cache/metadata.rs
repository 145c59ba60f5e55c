//! In-memory store of per-wallet block metadata and historical rates.
//!
//! The cache never fetches anything. Callers that find a rate missing are
//! responsible for asking the rate collaborator and writing the result back.

use rust_decimal::Decimal;
use std::collections::HashMap;
use txfeed_sdk::objects::{AssetCode, Wallet};

/// Confirmation threshold assumed for wallets that never reported one.
pub const DEFAULT_CONFIRMATION_THRESHOLD: u32 = 1;

/// Key of a cached historical rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub asset: AssetCode,
    /// Unix timestamp in whole seconds.
    pub timestamp: i64,
}

impl RateKey {
    pub fn new(asset: AssetCode, timestamp: i64) -> Self {
        Self { asset, timestamp }
    }
}

/// Block metadata of one wallet as needed to classify confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    pub last_block_height: Option<u64>,
    pub confirmation_threshold: u32,
}

#[derive(Debug, Default)]
pub struct MetadataCache {
    block_heights: HashMap<Wallet, u64>,
    thresholds: HashMap<Wallet, u32>,
    rates: HashMap<RateKey, Decimal>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the last known chain tip of `wallet`.
    ///
    /// There is no ordering check: a lower height replaces a higher one.
    /// Callers that need the delta must read the previous value first.
    pub fn set_block_height(&mut self, wallet: &Wallet, height: u64) {
        self.block_heights.insert(wallet.clone(), height);
    }

    pub fn block_height(&self, wallet: &Wallet) -> Option<u64> {
        self.block_heights.get(wallet).copied()
    }

    pub fn set_confirmation_threshold(&mut self, wallet: &Wallet, threshold: u32) {
        self.thresholds.insert(wallet.clone(), threshold);
    }

    pub fn confirmation_threshold(&self, wallet: &Wallet) -> u32 {
        self.thresholds
            .get(wallet)
            .copied()
            .unwrap_or(DEFAULT_CONFIRMATION_THRESHOLD)
    }

    pub fn block_meta(&self, wallet: &Wallet) -> BlockMeta {
        BlockMeta {
            last_block_height: self.block_height(wallet),
            confirmation_threshold: self.confirmation_threshold(wallet),
        }
    }

    pub fn set_rate(&mut self, asset: &AssetCode, timestamp: i64, value: Decimal) {
        self.rates
            .insert(RateKey::new(asset.clone(), timestamp), value);
    }

    pub fn rate(&self, asset: &AssetCode, timestamp: i64) -> Option<Decimal> {
        self.rates
            .get(&RateKey::new(asset.clone(), timestamp))
            .copied()
    }

    /// Drops every cached rate. Block heights and thresholds are kept.
    pub fn clear_rates(&mut self) {
        self.rates.clear();
    }

    pub fn rates_len(&self) -> usize {
        self.rates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn wallet(asset: &str) -> Wallet {
        Wallet::new(Uuid::new_v4(), AssetCode::new(asset).unwrap())
    }

    #[test]
    fn test_threshold_defaults_to_one() {
        let cache = MetadataCache::new();
        let btc = wallet("BTC");
        assert_eq!(cache.confirmation_threshold(&btc), 1);
        assert_eq!(
            cache.block_meta(&btc),
            BlockMeta {
                last_block_height: None,
                confirmation_threshold: 1,
            }
        );
    }

    #[test]
    fn test_block_height_overwrites_without_ordering_check() {
        let mut cache = MetadataCache::new();
        let btc = wallet("BTC");
        cache.set_block_height(&btc, 100);
        cache.set_block_height(&btc, 90);
        assert_eq!(cache.block_height(&btc), Some(90));
    }

    #[test]
    fn test_set_rate_is_idempotent_and_clearable() {
        let mut cache = MetadataCache::new();
        let asset = AssetCode::new("ETH").unwrap();
        let rate = Decimal::new(185_050, 2);

        cache.set_rate(&asset, 1_700_000_000, rate);
        cache.set_rate(&asset, 1_700_000_000, rate);
        assert_eq!(cache.rates_len(), 1);
        assert_eq!(cache.rate(&asset, 1_700_000_000), Some(rate));

        cache.clear_rates();
        assert_eq!(cache.rate(&asset, 1_700_000_000), None);
    }

    #[test]
    fn test_clear_rates_keeps_block_meta() {
        let mut cache = MetadataCache::new();
        let eth = wallet("ETH");
        cache.set_block_height(&eth, 42);
        cache.set_confirmation_threshold(&eth, 12);
        cache.set_rate(&eth.asset, 1, Decimal::ONE);

        cache.clear_rates();

        assert_eq!(cache.block_height(&eth), Some(42));
        assert_eq!(cache.confirmation_threshold(&eth), 12);
    }

    #[test]
    fn test_rates_are_keyed_per_asset() {
        let mut cache = MetadataCache::new();
        let btc = AssetCode::new("BTC").unwrap();
        let eth = AssetCode::new("ETH").unwrap();
        cache.set_rate(&btc, 10, Decimal::TEN);
        assert_eq!(cache.rate(&eth, 10), None);
        assert_eq!(cache.rate(&btc, 11), None);
    }
}
