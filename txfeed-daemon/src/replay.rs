//! Record and rate sources backed by local files.
//!
//! Each wallet's history is a JSON array of transaction records. The order
//! inside the file does not matter; histories are served newest first.

use crate::config::ConfigError;
use crate::config::file::RateEntry;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use txfeed_core::processors::{FetchError, RateError, RateResolver, RecordFetcher};
use txfeed_sdk::objects::{AssetCode, CurrencyCode, TransactionRecord, Wallet};

/// Serves wallet histories loaded from fixture files.
pub struct FixtureFetcher {
    histories: RwLock<HashMap<Wallet, Vec<TransactionRecord>>>,
}

impl FixtureFetcher {
    pub fn load(fixtures: &HashMap<Wallet, PathBuf>) -> Result<Self, ConfigError> {
        Ok(Self {
            histories: RwLock::new(load_histories(fixtures)?),
        })
    }

    /// Replace every history, e.g. after the fixture files changed.
    pub async fn reload(&self, fixtures: &HashMap<Wallet, PathBuf>) -> Result<(), ConfigError> {
        let histories = load_histories(fixtures)?;
        *self.histories.write().await = histories;
        Ok(())
    }
}

fn load_histories(
    fixtures: &HashMap<Wallet, PathBuf>,
) -> Result<HashMap<Wallet, Vec<TransactionRecord>>, ConfigError> {
    fixtures
        .iter()
        .map(|(wallet, path)| {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
                path: path.clone(),
                source,
            })?;
            let mut records: Vec<TransactionRecord> =
                serde_json::from_str(&content).map_err(|source| ConfigError::FixtureError {
                    path: path.clone(),
                    source,
                })?;
            records.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| a.hash.cmp(&b.hash))
            });
            tracing::debug!(wallet = %wallet, count = records.len(), path = %path.display(), "Loaded fixture");
            Ok((wallet.clone(), records))
        })
        .collect()
}

#[async_trait]
impl RecordFetcher for FixtureFetcher {
    async fn fetch_records(
        &self,
        wallet: &Wallet,
        from_hash: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, FetchError> {
        let histories = self.histories.read().await;
        let history = histories
            .get(wallet)
            .ok_or_else(|| FetchError::UnknownWallet(wallet.clone()))?;
        let start = match from_hash {
            Some(hash) => history
                .iter()
                .position(|record| record.hash == hash)
                .map(|position| position + 1)
                .ok_or_else(|| FetchError::Source(format!("unknown cursor {hash} for {wallet}")))?,
            None => 0,
        };
        Ok(history.iter().skip(start).take(limit).cloned().collect())
    }
}

/// Resolves rates from the `[[rates]]` table of the config file.
pub struct StaticRates {
    table: RwLock<HashMap<(AssetCode, CurrencyCode), Decimal>>,
}

impl StaticRates {
    pub fn new(entries: &[RateEntry]) -> Self {
        Self {
            table: RwLock::new(rate_table(entries)),
        }
    }

    pub async fn reload(&self, entries: &[RateEntry]) {
        *self.table.write().await = rate_table(entries);
    }
}

fn rate_table(entries: &[RateEntry]) -> HashMap<(AssetCode, CurrencyCode), Decimal> {
    entries
        .iter()
        .map(|entry| ((entry.asset.clone(), entry.currency.clone()), entry.value))
        .collect()
}

#[async_trait]
impl RateResolver for StaticRates {
    async fn resolve_rate(
        &self,
        asset: &AssetCode,
        currency: &CurrencyCode,
        timestamp: i64,
    ) -> Result<Decimal, RateError> {
        self.table
            .read()
            .await
            .get(&(asset.clone(), currency.clone()))
            .copied()
            .ok_or_else(|| RateError::Unavailable {
                asset: asset.clone(),
                currency: currency.clone(),
                timestamp,
            })
    }
}
