//! Derivation of display rows from stored transactions.

use crate::aggregator::TransactionItem;
use crate::cache::{MetadataCache, RateKey};
use crate::utils::confirmation_state;
use time::OffsetDateTime;
use tracing::warn;
use txfeed_sdk::objects::{CurrencyCode, FiatValue, ViewItem};

/// Builds the row for `item` from the current cache contents.
///
/// When no rate is cached for the transaction's timestamp the row carries no
/// fiat value and the missing key is returned so the caller can request it.
/// A value too large for a `Decimal` also leaves the fiat value empty, but
/// is not reported as missing.
pub fn derive_view_item(
    item: &TransactionItem,
    cache: &MetadataCache,
    currency: &CurrencyCode,
) -> (ViewItem, Option<RateKey>) {
    let record = &item.record;
    let confirmation = confirmation_state(record.block_height, cache.block_meta(&item.wallet));

    let (fiat_value, missing_rate) = match cache.rate(&item.wallet.asset, record.timestamp) {
        Some(rate) => match record.amount.checked_mul(rate) {
            Some(value) => (
                Some(FiatValue {
                    currency: currency.clone(),
                    rate,
                    value,
                }),
                None,
            ),
            None => {
                warn!(
                    hash = %record.hash,
                    amount = %record.amount,
                    rate = %rate,
                    "Fiat value overflows, showing the row without it"
                );
                (None, None)
            }
        },
        None => (None, Some(RateKey::new(item.wallet.asset.clone(), record.timestamp))),
    };

    let view = ViewItem {
        wallet: item.wallet.clone(),
        hash: record.hash.clone(),
        timestamp: record.timestamp,
        date: OffsetDateTime::from_unix_timestamp(record.timestamp)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        amount: record.amount,
        fee: record.fee,
        direction: record.direction,
        block_height: record.block_height,
        confirmation,
        fiat_value,
        from_address: record.from_address.clone(),
        to_address: record.to_address.clone(),
    };
    (view, missing_rate)
}
