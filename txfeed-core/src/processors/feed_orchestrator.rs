//! FeedOrchestrator processor.
//!
//! The FeedOrchestrator is responsible for:
//! - Owning the `RecordAggregator` and `MetadataCache` exclusively
//! - Reconciling `FeedConfig` changes (wallet set, thresholds, base currency)
//! - Loading pages through the `RecordFetcher`, one fetch at a time
//! - Requesting missing rates through the `RateResolver`
//! - Emitting `FeedUpdate`s with the smallest change that describes each
//!   event: an append, a patch of a few rows, or a full rebuild
//!
//! Fetches and rate lookups run in spawned tasks and report back over an
//! internal completion channel, so every state change happens on the
//! orchestrator task in the order the events were received.

use crate::aggregator::{RecordAggregator, TransactionItem};
use crate::cache::{MetadataCache, RateKey};
use crate::config::{ConfigStore, ConfigWatcher, FeedConfig};
use crate::events::{
    FeedEvent, FeedEventReceiver, FeedUpdate, FeedUpdateSender, Projection, ProjectionChange,
    DEFAULT_CHANNEL_BUFFER,
};
use crate::processors::sources::{fetch_batch, FetchError, RateError, RateResolver, RecordFetcher};
use crate::projection::derive_view_item;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use txfeed_sdk::objects::{CurrencyCode, FilterOption, TransactionRecord, ViewItem, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoaderState {
    Idle,
    Loading,
}

/// Results of work spawned by the orchestrator.
#[derive(Debug)]
enum Completion {
    RecordsFetched {
        generation: u64,
        result: Result<HashMap<Wallet, Vec<TransactionRecord>>, FetchError>,
    },
    RateFetched {
        key: RateKey,
        currency: CurrencyCode,
        result: Result<Decimal, RateError>,
    },
}

/// Serialized owner of the feed state.
///
/// Like the other processors, the signal receivers are injected when
/// calling [`run()`](FeedOrchestrator::run) rather than owned by the struct.
///
/// # Backpressure
///
/// `FeedUpdate`s go out over a bounded channel and the orchestrator waits
/// for room before it handles anything else. A display that stops reading
/// therefore stalls the whole feed, config changes and shutdown included,
/// but no update is dropped while the receiver is alive. Once the receiver
/// is dropped, updates are discarded and events keep being handled.
pub struct FeedOrchestrator {
    fetcher: Arc<dyn RecordFetcher>,
    rates: Arc<dyn RateResolver>,
    update_tx: FeedUpdateSender,

    aggregator: RecordAggregator,
    cache: MetadataCache,
    /// Derived rows, index-aligned with `aggregator.items()`.
    view_items: Vec<ViewItem>,
    config: Option<FeedConfig>,

    loader: LoaderState,
    /// Bumped on every dataset reset; fetch completions carrying an older
    /// generation are discarded.
    generation: u64,
    in_flight: Option<JoinHandle<()>>,

    pending_rates: HashSet<RateKey>,
    rate_lookups: JoinSet<()>,

    completion_tx: mpsc::Sender<Completion>,
    completions: mpsc::Receiver<Completion>,
}

impl FeedOrchestrator {
    pub fn new(
        fetcher: Arc<dyn RecordFetcher>,
        rates: Arc<dyn RateResolver>,
        update_tx: FeedUpdateSender,
    ) -> Self {
        let (completion_tx, completions) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        Self {
            fetcher,
            rates,
            update_tx,
            aggregator: RecordAggregator::new(crate::aggregator::DEFAULT_PAGE_SIZE),
            cache: MetadataCache::new(),
            view_items: Vec::new(),
            config: None,
            loader: LoaderState::Idle,
            generation: 0,
            in_flight: None,
            pending_rates: HashSet::new(),
            rate_lookups: JoinSet::new(),
            completion_tx,
            completions,
        }
    }

    /// Run the FeedOrchestrator until shutdown is signaled or every event
    /// sender is dropped.
    ///
    /// This method:
    /// 1. Applies the initial config, which loads the first page
    /// 2. Reconciles config changes as they are published
    /// 3. Applies fetch and rate completions
    /// 4. Handles `FeedEvent`s from collaborators and the UI
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut event_rx: FeedEventReceiver,
        config_store: ConfigStore<FeedConfig>,
        mut config_watcher: ConfigWatcher,
    ) {
        let config = config_store.current().await;
        info!(
            wallets = config.wallets.len(),
            page_size = config.page_size,
            currency = %config.base_currency,
            "FeedOrchestrator started"
        );
        self.apply_config(config).await;

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("FeedOrchestrator received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let config = config_store.current().await;
                    self.apply_config(config).await;
                    info!(
                        wallets = self.aggregator.wallets().len(),
                        "FeedOrchestrator reconciled config"
                    );
                }

                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion).await;
                }

                event = event_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("FeedEvent channel closed");
                        break;
                    }
                },
            }
        }

        self.cancel_in_flight();
        self.rate_lookups.abort_all();
        info!("FeedOrchestrator shutdown complete");
    }

    // -- Configuration ------------------------------------------------------

    async fn apply_config(&mut self, config: FeedConfig) {
        let previous = self.config.replace(config.clone());

        let currency_changed = previous
            .as_ref()
            .is_some_and(|p| p.base_currency != config.base_currency);
        if currency_changed {
            info!(currency = %config.base_currency, "Base currency changed, clearing rates");
            self.cache.clear_rates();
            self.pending_rates.clear();
            self.rate_lookups.abort_all();
        }

        let wallet_set_changed = previous.as_ref().is_none_or(|p| {
            p.wallet_keys() != config.wallet_keys() || p.page_size != config.page_size
        });
        let wallet_meta_changed = previous.as_ref().is_some_and(|p| p.wallets != config.wallets);

        self.apply_wallet_meta(&config, previous.as_ref());
        if wallet_set_changed {
            self.on_wallet_set_changed(&config).await;
        } else if wallet_meta_changed || currency_changed {
            self.rebuild().await;
        }
    }

    /// Copies configured thresholds and heights into the cache. A height is
    /// only written when it differs from the previously configured one, so a
    /// reload does not roll back tips reported by the sync engines.
    fn apply_wallet_meta(&mut self, config: &FeedConfig, previous: Option<&FeedConfig>) {
        for entry in &config.wallets {
            self.cache
                .set_confirmation_threshold(&entry.wallet, entry.confirmation_threshold);
            let Some(height) = entry.last_block_height else {
                continue;
            };
            let previous_height = previous
                .and_then(|p| p.wallets.iter().find(|w| w.wallet == entry.wallet))
                .and_then(|w| w.last_block_height);
            if previous_height != Some(height) {
                self.cache.set_block_height(&entry.wallet, height);
            }
        }
    }

    async fn on_wallet_set_changed(&mut self, config: &FeedConfig) {
        let wallets = config.wallet_keys();
        info!(
            wallets = wallets.len(),
            page_size = config.page_size,
            "Wallet set changed, reloading feed"
        );
        self.emit(FeedUpdate::FilterOptions(filter_options(&wallets)))
            .await;
        if self.aggregator.page_size() != config.page_size.max(1) {
            self.aggregator = RecordAggregator::new(config.page_size);
        }
        self.reset_feed(wallets).await;
    }

    // -- Events -------------------------------------------------------------

    async fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::LoadNext => self.load_next().await,
            FeedEvent::SelectWallet(wallet) => self.select_wallet(wallet).await,
            FeedEvent::RecordsChanged { wallet, records } => {
                if !self.knows_wallet(&wallet) {
                    debug!(wallet = %wallet, "Ignoring records of unknown wallet");
                    return;
                }
                debug!(wallet = %wallet, count = records.len(), "Records changed");
                if self.aggregator.handle_updated_records(records, &wallet) {
                    self.rebuild().await;
                }
            }
            FeedEvent::ChainTipChanged { wallet, height } => {
                self.on_chain_tip(wallet, height).await;
            }
            FeedEvent::RateResolved {
                asset,
                currency,
                timestamp,
                rate,
            } => {
                let key = RateKey::new(asset, timestamp);
                self.on_rate(key, currency, rate).await;
            }
            FeedEvent::ConnectivityRestored => {
                debug!("Connectivity restored, rebuilding feed");
                self.rebuild().await;
            }
            FeedEvent::Refresh => {
                debug!("Refreshing feed");
                self.rebuild().await;
            }
            FeedEvent::SelectItem(index) => match self.view_items.get(index).cloned() {
                Some(item) => self.emit(FeedUpdate::OpenDetail(item)).await,
                None => debug!(index, "Ignoring selection outside the feed"),
            },
        }
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::RecordsFetched { generation, result } => {
                self.on_records_fetched(generation, result).await;
            }
            Completion::RateFetched {
                key,
                currency,
                result,
            } => match result {
                Ok(rate) => self.on_rate(key, currency, rate).await,
                Err(err) => {
                    if self.is_base_currency(&currency) {
                        self.pending_rates.remove(&key);
                    }
                    debug!(asset = %key.asset, timestamp = key.timestamp, error = %err, "Rate unavailable");
                }
            },
        }
    }

    async fn select_wallet(&mut self, wallet: Option<Wallet>) {
        let Some(config) = &self.config else {
            debug!("Ignoring wallet selection before configuration");
            return;
        };
        let wallets = match wallet {
            Some(wallet) if config.contains(&wallet) => vec![wallet],
            Some(wallet) => {
                debug!(wallet = %wallet, "Ignoring selection of unknown wallet");
                return;
            }
            None => config.wallet_keys(),
        };
        debug!(wallets = wallets.len(), "Wallet filter changed");
        self.reset_feed(wallets).await;
    }

    async fn on_chain_tip(&mut self, wallet: Wallet, height: u64) {
        if !self.knows_wallet(&wallet) {
            debug!(wallet = %wallet, "Ignoring chain tip of unknown wallet");
            return;
        }
        let previous = self.cache.block_height(&wallet);
        self.cache.set_block_height(&wallet, height);
        debug!(wallet = %wallet, height, ?previous, "Chain tip changed");

        match previous {
            None => self.rebuild().await,
            Some(previous) => {
                let threshold = u64::from(self.cache.confirmation_threshold(&wallet));
                // The lower of both tips also covers a reorganized chain.
                let floor = previous.min(height).saturating_sub(threshold);
                let indexes = self.aggregator.item_indexes_for_pending(&wallet, floor);
                self.patch(indexes).await;
            }
        }
    }

    async fn on_rate(&mut self, key: RateKey, currency: CurrencyCode, rate: Decimal) {
        if !self.is_base_currency(&currency) {
            debug!(asset = %key.asset, currency = %currency, "Discarding rate for previous currency");
            return;
        }
        self.pending_rates.remove(&key);
        self.cache.set_rate(&key.asset, key.timestamp, rate);
        let indexes = self
            .aggregator
            .item_indexes_for_timestamp(&key.asset, key.timestamp);
        self.patch(indexes).await;
    }

    // -- Paging -------------------------------------------------------------

    async fn load_next(&mut self) {
        if self.loader == LoaderState::Loading {
            debug!(generation = self.generation, "Page fetch already in flight");
            return;
        }
        if self.aggregator.all_shown() {
            debug!("Feed fully loaded");
            return;
        }
        if self.begin_fetch() {
            self.emit_projection(ProjectionChange::Loading).await;
        } else {
            // Every open wallet already has a page staged.
            let (from, count) = self.merge_page();
            self.emit_projection(ProjectionChange::Appended { from, count })
                .await;
        }
    }

    /// Starts over from the first page with `wallets` selected.
    async fn reset_feed(&mut self, wallets: Vec<Wallet>) {
        self.cancel_in_flight();
        self.aggregator.reset();
        self.aggregator.set_wallets(wallets);
        self.view_items.clear();
        if !self.aggregator.all_shown() && !self.begin_fetch() {
            self.merge_page();
        }
        self.emit_projection(ProjectionChange::Reset).await;
    }

    /// Spawns the fetch for the next page. Returns `false` when nothing
    /// needs to be fetched.
    fn begin_fetch(&mut self) -> bool {
        let requests = self.aggregator.fetch_data_list();
        if requests.is_empty() {
            return false;
        }

        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let completion_tx = self.completion_tx.clone();
        let timeout = self.fetch_timeout();
        debug!(generation, requests = requests.len(), "Fetching next page");

        self.in_flight = Some(tokio::spawn(async move {
            let result = fetch_batch(fetcher.as_ref(), requests, timeout).await;
            let _ = completion_tx
                .send(Completion::RecordsFetched { generation, result })
                .await;
        }));
        self.loader = LoaderState::Loading;
        true
    }

    async fn on_records_fetched(
        &mut self,
        generation: u64,
        result: Result<HashMap<Wallet, Vec<TransactionRecord>>, FetchError>,
    ) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Discarding stale page");
            return;
        }
        self.in_flight = None;
        self.loader = LoaderState::Idle;

        match result {
            Ok(records) => {
                let visible_changed = self.aggregator.handle_fetched_records(records);
                let (from, count) = self.merge_page();
                debug!(generation, from, count, "Page merged");
                if visible_changed {
                    self.rebuild().await;
                } else {
                    self.emit_projection(ProjectionChange::Appended { from, count })
                        .await;
                }
            }
            Err(err) => {
                warn!(generation, error = %err, "Page fetch failed");
                self.emit(FeedUpdate::FetchFailed {
                    reason: err.to_string(),
                })
                .await;
            }
        }
    }

    /// Moves the next page into the feed and derives its rows.
    fn merge_page(&mut self) -> (usize, usize) {
        let from = self.aggregator.items_count();
        let count = self.aggregator.increase_page();
        let (rows, missing) = self.derive_rows(&self.aggregator.items()[from..]);
        self.view_items.extend(rows);
        self.request_rates(missing);
        (from, count)
    }

    fn cancel_in_flight(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.loader = LoaderState::Idle;
    }

    // -- Projection ---------------------------------------------------------

    fn derive_rows(&self, items: &[TransactionItem]) -> (Vec<ViewItem>, Vec<RateKey>) {
        let Some(config) = &self.config else {
            return (Vec::new(), Vec::new());
        };
        let mut missing = Vec::new();
        let rows = items
            .iter()
            .map(|item| {
                let (view, rate) = derive_view_item(item, &self.cache, &config.base_currency);
                missing.extend(rate);
                view
            })
            .collect();
        (rows, missing)
    }

    async fn rebuild(&mut self) {
        let (rows, missing) = self.derive_rows(self.aggregator.items());
        self.view_items = rows;
        self.request_rates(missing);
        self.emit_projection(ProjectionChange::Rebuilt).await;
    }

    /// Re-derives the rows at `indexes` and emits only those that changed.
    async fn patch(&mut self, indexes: Vec<usize>) {
        let Some(config) = &self.config else {
            return;
        };
        let mut changed = Vec::new();
        let mut missing = Vec::new();
        for index in indexes {
            let (Some(item), Some(slot)) = (
                self.aggregator.item_for_index(index),
                self.view_items.get_mut(index),
            ) else {
                continue;
            };
            let (view, rate) = derive_view_item(item, &self.cache, &config.base_currency);
            missing.extend(rate);
            if *slot != view {
                *slot = view;
                changed.push(index);
            }
        }
        self.request_rates(missing);
        if !changed.is_empty() {
            self.emit_projection(ProjectionChange::Patched { indexes: changed })
                .await;
        }
    }

    fn request_rates(&mut self, keys: Vec<RateKey>) {
        let Some(config) = &self.config else {
            return;
        };
        for key in keys {
            if !self.pending_rates.insert(key.clone()) {
                continue;
            }
            let resolver = Arc::clone(&self.rates);
            let completion_tx = self.completion_tx.clone();
            let currency = config.base_currency.clone();
            self.rate_lookups.spawn(async move {
                let result = resolver
                    .resolve_rate(&key.asset, &currency, key.timestamp)
                    .await;
                let _ = completion_tx
                    .send(Completion::RateFetched {
                        key,
                        currency,
                        result,
                    })
                    .await;
            });
        }
        while self.rate_lookups.try_join_next().is_some() {}
    }

    async fn emit_projection(&self, change: ProjectionChange) {
        let projection = Projection {
            items: Arc::from(self.view_items.as_slice()),
            change,
            loading: self.loader == LoaderState::Loading,
            all_shown: self.aggregator.all_shown(),
        };
        self.emit(FeedUpdate::Projection(projection)).await;
    }

    /// Waits for channel capacity; see the backpressure notes on the struct.
    async fn emit(&self, update: FeedUpdate) {
        if self.update_tx.send(update).await.is_err() {
            warn!("FeedUpdate channel closed, dropping update");
        }
    }

    // -- Helpers ------------------------------------------------------------

    fn knows_wallet(&self, wallet: &Wallet) -> bool {
        self.config.as_ref().is_some_and(|c| c.contains(wallet))
    }

    fn is_base_currency(&self, currency: &CurrencyCode) -> bool {
        self.config
            .as_ref()
            .is_some_and(|c| &c.base_currency == currency)
    }

    fn fetch_timeout(&self) -> std::time::Duration {
        self.config
            .as_ref()
            .map_or(crate::config::DEFAULT_FETCH_TIMEOUT, |c| c.fetch_timeout)
    }
}

/// Filter entries for a wallet set: nothing to choose from below two
/// wallets, otherwise "all" followed by each wallet.
fn filter_options(wallets: &[Wallet]) -> Vec<FilterOption> {
    if wallets.len() < 2 {
        return Vec::new();
    }
    std::iter::once(FilterOption::All)
        .chain(wallets.iter().map(|wallet| FilterOption::Wallet {
            wallet: wallet.clone(),
        }))
        .collect()
}
