//! Collaborator interfaces of the feed.
//!
//! The orchestrator never talks to a blockchain or a rate service directly.
//! Record pages come from a [`RecordFetcher`] (usually backed by the wallet's
//! sync engine storage), historical rates from a [`RateResolver`].

use crate::aggregator::FetchRequest;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use txfeed_sdk::objects::{AssetCode, CurrencyCode, TransactionRecord, Wallet};

/// Errors that can occur while loading a page of records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The whole batch did not complete within the configured timeout.
    #[error("record fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The fetcher has no history for this wallet.
    #[error("unknown wallet: {0}")]
    UnknownWallet(Wallet),

    /// The underlying storage or sync engine failed.
    #[error("record source error: {0}")]
    Source(String),
}

/// Errors that can occur while resolving a historical rate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateError {
    /// No rate is known for this point in time.
    #[error("no rate for {asset}/{currency} at {timestamp}")]
    Unavailable {
        asset: AssetCode,
        currency: CurrencyCode,
        timestamp: i64,
    },

    /// The rate service failed.
    #[error("rate source error: {0}")]
    Source(String),
}

/// Source of transaction history pages.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Fetch up to `limit` records of `wallet`, newest first.
    ///
    /// With `from_hash` set, the page starts right after the record with
    /// that hash. Returning fewer than `limit` records marks the end of the
    /// wallet's history.
    async fn fetch_records(
        &self,
        wallet: &Wallet,
        from_hash: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, FetchError>;
}

/// Source of historical exchange rates.
#[async_trait]
pub trait RateResolver: Send + Sync {
    /// Rate of one unit of `asset` in `currency` at `timestamp`.
    async fn resolve_rate(
        &self,
        asset: &AssetCode,
        currency: &CurrencyCode,
        timestamp: i64,
    ) -> Result<Decimal, RateError>;
}

/// Run every request of a page load concurrently.
///
/// The batch fails as a whole when any request fails or when it does not
/// finish within `timeout`.
pub async fn fetch_batch(
    fetcher: &dyn RecordFetcher,
    requests: Vec<FetchRequest>,
    timeout: Duration,
) -> Result<HashMap<Wallet, Vec<TransactionRecord>>, FetchError> {
    let fetches = requests.into_iter().map(|request| async move {
        let records = fetcher
            .fetch_records(&request.wallet, request.from_hash.as_deref(), request.limit)
            .await?;
        Ok::<_, FetchError>((request.wallet, records))
    });

    match tokio::time::timeout(timeout, try_join_all(fetches)).await {
        Ok(result) => Ok(result?.into_iter().collect()),
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}
