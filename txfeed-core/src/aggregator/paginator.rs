//! Merges the histories of several wallets into one paginated feed.
//!
//! Each selected wallet owns a pool: a backlog of fetched records that are
//! not visible yet, the last fetched record (the cursor for the next fetch),
//! live records held until the fetches reach them and an "exhausted" flag.
//! [`RecordAggregator::increase_page`] moves records from the backlogs into
//! the visible sequence with a k-way merge, newest first.
//!
//! The aggregator is not synchronized. It is owned by the feed orchestrator
//! task and only ever touched from there.

use itertools::Itertools;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;
use txfeed_sdk::objects::{AssetCode, TransactionRecord, Wallet};

use super::item::{FetchRequest, TransactionItem};

/// Page size used when the configuration does not provide one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Default)]
struct WalletPool {
    /// Fetched but not yet visible, in feed order. Always a gap-free run of
    /// the wallet's history ending at `last_fetched`.
    backlog: VecDeque<TransactionItem>,
    /// Last record received through a page fetch; its hash is the cursor
    /// of the next fetch.
    last_fetched: Option<TransactionItem>,
    /// Live records older than `last_fetched`, held until a fetch reaches
    /// them. Never counted by `fetch_data_list` or the merge.
    held: Vec<TransactionItem>,
    /// Limit of the request handed out by the last `fetch_data_list`.
    requested: Option<usize>,
    exhausted: bool,
    /// Hashes of this wallet's records in the visible sequence.
    visible: HashSet<String>,
}

impl WalletPool {
    fn insert_backlog(&mut self, item: TransactionItem) {
        let pos = self.backlog.partition_point(|existing| existing.shown_before(&item));
        self.backlog.insert(pos, item);
    }

    fn cursor(&self) -> Option<String> {
        self.last_fetched.as_ref().map(|item| item.record.hash.clone())
    }

    /// Whether every record of the wallet down to `item` has been fetched.
    fn covers(&self, item: &TransactionItem) -> bool {
        self.exhausted
            || self
                .last_fetched
                .as_ref()
                .is_some_and(|boundary| !boundary.shown_before(item))
    }

    /// Removes any staged copy of `hash`.
    fn forget(&mut self, hash: &str) {
        if let Some(pos) = self.backlog.iter().position(|i| i.record.hash == hash) {
            self.backlog.remove(pos);
        }
        self.held.retain(|i| i.record.hash != hash);
    }

    /// Stages a record that is not visible, replacing any staged copy.
    fn stage(&mut self, item: TransactionItem) {
        self.forget(&item.record.hash);
        if self.covers(&item) {
            self.insert_backlog(item);
        } else {
            self.held.push(item);
        }
    }

    /// Moves held records the fetches have caught up with into the backlog.
    /// A fetched copy of the same record wins over the held one.
    fn release_held(&mut self) {
        for item in std::mem::take(&mut self.held) {
            let hash = &item.record.hash;
            if self.visible.contains(hash) || self.backlog.iter().any(|i| &i.record.hash == hash) {
                continue;
            }
            if self.covers(&item) {
                self.insert_backlog(item);
            } else {
                self.held.push(item);
            }
        }
    }

    /// Clears the exhausted flag. Records staged past the last fetched one
    /// while the wallet was exhausted go back to being held.
    fn reopen(&mut self) {
        self.exhausted = false;
        self.requested = None;
        for item in std::mem::take(&mut self.backlog) {
            self.stage(item);
        }
    }
}

#[derive(Debug)]
pub struct RecordAggregator {
    page_size: usize,
    wallets: Vec<Wallet>,
    pools: HashMap<Wallet, WalletPool>,
    items: Vec<TransactionItem>,
}

impl RecordAggregator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            wallets: Vec::new(),
            pools: HashMap::new(),
            items: Vec::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.wallets
    }

    pub fn is_selected(&self, wallet: &Wallet) -> bool {
        self.pools.contains_key(wallet)
    }

    /// Replaces the wallet selection.
    ///
    /// Pools and visible rows of deselected wallets are discarded and every
    /// exhausted flag is reset. Rows of wallets that stay selected are kept;
    /// call [`reset`](Self::reset) to start over from the first page.
    pub fn set_wallets(&mut self, wallets: Vec<Wallet>) {
        let mut selected = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            if !selected.contains(&wallet) {
                selected.push(wallet);
            }
        }

        self.pools.retain(|wallet, _| selected.contains(wallet));
        self.items.retain(|item| selected.contains(&item.wallet));
        for wallet in &selected {
            self.pools.entry(wallet.clone()).or_default().reopen();
        }
        self.wallets = selected;
    }

    /// Drops the visible sequence together with every backlog and cursor.
    pub fn reset(&mut self) {
        self.items.clear();
        for pool in self.pools.values_mut() {
            *pool = WalletPool::default();
        }
    }

    /// Requests needed before the next page can be merged.
    ///
    /// A wallet is asked for more records only while it is not exhausted
    /// and its backlog holds no more than one page. The limit tops the
    /// backlog up to one record beyond a full page, which guarantees that
    /// every non-exhausted wallet can contribute to a merged page without
    /// hiding a newer, still unfetched record.
    pub fn fetch_data_list(&mut self) -> Vec<FetchRequest> {
        let page_size = self.page_size;
        let mut requests = Vec::new();
        for wallet in &self.wallets {
            let Some(pool) = self.pools.get_mut(wallet) else {
                continue;
            };
            if pool.exhausted || pool.backlog.len() > page_size {
                continue;
            }
            let limit = page_size + 1 - pool.backlog.len();
            pool.requested = Some(limit);
            requests.push(FetchRequest {
                wallet: wallet.clone(),
                from_hash: pool.cursor(),
                limit,
            });
        }
        requests
    }

    /// Stages fetched records into the wallets' backlogs.
    ///
    /// A wallet that returned fewer records than requested is marked
    /// exhausted. Records of wallets that are not selected are dropped.
    /// A fetched record that is already visible replaces the visible row;
    /// the return value tells whether that happened.
    pub fn handle_fetched_records(&mut self, records: HashMap<Wallet, Vec<TransactionRecord>>) -> bool {
        let mut visible_changed = false;
        for (wallet, records) in records {
            let Some(pool) = self.pools.get_mut(&wallet) else {
                debug!(wallet = %wallet, "Dropping fetched records of unselected wallet");
                continue;
            };

            let expected = pool.requested.take().unwrap_or(self.page_size);
            if records.len() < expected {
                pool.exhausted = true;
            }
            if let Some(last) = records.last() {
                pool.last_fetched = Some(TransactionItem::new(wallet.clone(), last.clone()));
            }

            for record in records {
                if pool.visible.contains(&record.hash) {
                    if let Some(index) = self
                        .items
                        .iter()
                        .position(|i| i.wallet == wallet && i.record.hash == record.hash)
                    {
                        visible_changed |= replace_visible(&mut self.items, index, record);
                    }
                    continue;
                }
                pool.forget(&record.hash);
                pool.insert_backlog(TransactionItem::new(wallet.clone(), record));
            }
            pool.release_held();
        }
        visible_changed
    }

    /// Merges up to one page from the backlogs into the visible sequence.
    ///
    /// Returns the number of appended rows; `0` means nothing can be shown
    /// until more records are fetched. The merge stops early once a wallet
    /// that may still have older records runs out of staged ones.
    pub fn increase_page(&mut self) -> usize {
        let mut remaining: HashMap<&Wallet, usize> = self
            .wallets
            .iter()
            .filter_map(|w| self.pools.get(w).map(|pool| (w, pool)))
            .filter(|(_, pool)| !pool.exhausted)
            .map(|(w, pool)| (w, pool.backlog.len()))
            .collect();
        let mut blocked = remaining.values().any(|len| *len == 0);

        let order: Vec<Wallet> = self
            .wallets
            .iter()
            .filter_map(|w| self.pools.get(w))
            .map(|pool| pool.backlog.iter())
            .kmerge_by(|a, b| a.shown_before(b))
            .take(self.page_size)
            .take_while(|item| {
                if blocked {
                    return false;
                }
                if let Some(left) = remaining.get_mut(&item.wallet) {
                    *left -= 1;
                    blocked = *left == 0;
                }
                true
            })
            .map(|item| item.wallet.clone())
            .collect();

        for wallet in &order {
            let Some(pool) = self.pools.get_mut(wallet) else {
                continue;
            };
            if let Some(item) = pool.backlog.pop_front() {
                pool.visible.insert(item.record.hash.clone());
                self.items.push(item);
            }
        }
        order.len()
    }

    pub fn items_count(&self) -> usize {
        self.items.len()
    }

    pub fn item_for_index(&self, index: usize) -> Option<&TransactionItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[TransactionItem] {
        &self.items
    }

    /// `true` once every selected wallet is exhausted and nothing is staged.
    pub fn all_shown(&self) -> bool {
        self.wallets.iter().all(|wallet| {
            self.pools
                .get(wallet)
                .is_none_or(|pool| pool.exhausted && pool.backlog.is_empty())
        })
    }

    /// Merges live updates of one wallet into the feed.
    ///
    /// A record with a known hash replaces the stored one; any other record
    /// is inserted at its sorted position when it falls inside the visible
    /// range, otherwise it is staged for a later page. Staged records older
    /// than the wallet's last fetched one are held back until a fetch gets
    /// there. Returns `true` only when the visible sequence changed.
    pub fn handle_updated_records(&mut self, records: Vec<TransactionRecord>, wallet: &Wallet) -> bool {
        let fully_loaded = self.all_shown();
        let Some(pool) = self.pools.get_mut(wallet) else {
            debug!(wallet = %wallet, "Ignoring updated records of unselected wallet");
            return false;
        };

        let mut changed = false;
        for record in records {
            if pool.visible.contains(&record.hash) {
                if let Some(index) = self
                    .items
                    .iter()
                    .position(|i| &i.wallet == wallet && i.record.hash == record.hash)
                {
                    changed |= replace_visible(&mut self.items, index, record);
                }
                continue;
            }

            let item = TransactionItem::new(wallet.clone(), record);
            let inside_visible_range = self
                .items
                .last()
                .is_some_and(|tail| item.shown_before(tail));
            if fully_loaded || inside_visible_range {
                pool.forget(&item.record.hash);
                pool.visible.insert(item.record.hash.clone());
                insert_sorted(&mut self.items, item);
                changed = true;
            } else {
                pool.stage(item);
            }
        }
        changed
    }

    /// Visible rows of `wallet` whose confirmation state can change once
    /// the chain tip moves past `block_height_floor`.
    ///
    /// Rows mined at or below the floor were already settled for the
    /// previous tip and unmined rows do not depend on the tip at all.
    pub fn item_indexes_for_pending(&self, wallet: &Wallet, block_height_floor: u64) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                &item.wallet == wallet
                    && item
                        .record
                        .block_height
                        .is_some_and(|height| height > block_height_floor)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Visible rows of `asset` that happened at `timestamp`.
    pub fn item_indexes_for_timestamp(&self, asset: &AssetCode, timestamp: i64) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| &item.wallet.asset == asset && item.record.timestamp == timestamp)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Replaces the record at `index`, moving it if its timestamp changed.
/// Returns whether anything observable changed.
fn replace_visible(items: &mut Vec<TransactionItem>, index: usize, record: TransactionRecord) -> bool {
    if items[index].record == record {
        return false;
    }
    if items[index].record.timestamp == record.timestamp {
        items[index].record = record;
    } else {
        let mut item = items.remove(index);
        item.record = record;
        insert_sorted(items, item);
    }
    true
}

fn insert_sorted(items: &mut Vec<TransactionItem>, item: TransactionItem) {
    let pos = items.partition_point(|existing| existing.shown_before(&item));
    items.insert(pos, item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal::Decimal;
    use txfeed_sdk::objects::TransactionDirection;
    use uuid::Uuid;

    fn wallet(asset: &str) -> Wallet {
        Wallet::new(Uuid::new_v4(), AssetCode::new(asset).unwrap())
    }

    fn record(hash: &str, timestamp: i64, block_height: Option<u64>) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            timestamp,
            amount: Decimal::ONE,
            fee: None,
            block_height,
            direction: TransactionDirection::Incoming,
            from_address: None,
            to_address: None,
        }
    }

    /// In-memory stand-in for the wallets' sync engines. Each history is
    /// stored newest first, the way sync engines page through it.
    struct Histories(HashMap<Wallet, Vec<TransactionRecord>>);

    impl Histories {
        fn serve(&self, requests: &[FetchRequest]) -> HashMap<Wallet, Vec<TransactionRecord>> {
            requests
                .iter()
                .map(|request| {
                    let history = self.0.get(&request.wallet).cloned().unwrap_or_default();
                    let start = match &request.from_hash {
                        Some(hash) => history
                            .iter()
                            .position(|r| &r.hash == hash)
                            .map_or(history.len(), |p| p + 1),
                        None => 0,
                    };
                    let page = history.into_iter().skip(start).take(request.limit).collect();
                    (request.wallet.clone(), page)
                })
                .collect()
        }
    }

    fn sort_history(history: &mut [TransactionRecord]) {
        history.sort_by(|x, y| y.timestamp.cmp(&x.timestamp).then_with(|| x.hash.cmp(&y.hash)));
    }

    fn load_next(aggregator: &mut RecordAggregator, histories: &Histories) -> usize {
        let requests = aggregator.fetch_data_list();
        if !requests.is_empty() {
            aggregator.handle_fetched_records(histories.serve(&requests));
        }
        aggregator.increase_page()
    }

    fn assert_feed_invariants(aggregator: &RecordAggregator) {
        let items = aggregator.items();
        for pair in items.windows(2) {
            assert!(pair[0].shown_before(&pair[1]), "feed out of order: {pair:?}");
        }
        let unique: HashSet<(&Wallet, &str)> = items
            .iter()
            .map(|i| (&i.wallet, i.record.hash.as_str()))
            .collect();
        assert_eq!(unique.len(), items.len(), "duplicate rows in feed");
    }

    #[test]
    fn test_two_wallets_paginate_into_one_feed() {
        let a = wallet("BTC");
        let b = wallet("ETH");
        let histories = Histories(HashMap::from([
            (
                a.clone(),
                vec![record("a1", 60, Some(10)), record("a2", 40, Some(9)), record("a3", 20, Some(8))],
            ),
            (
                b.clone(),
                vec![record("b1", 50, Some(5)), record("b2", 30, Some(4)), record("b3", 10, Some(3))],
            ),
        ]));

        let mut aggregator = RecordAggregator::new(5);
        aggregator.set_wallets(vec![a.clone(), b.clone()]);

        assert_eq!(load_next(&mut aggregator, &histories), 5);
        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a1", "b1", "a2", "b2", "a3"]);
        assert!(!aggregator.all_shown());

        assert!(aggregator.fetch_data_list().is_empty());
        assert_eq!(aggregator.increase_page(), 1);
        assert_eq!(aggregator.item_for_index(5).unwrap().record.hash, "b3");
        assert!(aggregator.all_shown());
        assert_eq!(aggregator.increase_page(), 0);
    }

    #[test]
    fn test_first_requests_have_no_cursor() {
        let a = wallet("BTC");
        let mut aggregator = RecordAggregator::new(3);
        aggregator.set_wallets(vec![a.clone()]);

        let requests = aggregator.fetch_data_list();
        assert_eq!(
            requests,
            vec![FetchRequest {
                wallet: a,
                from_hash: None,
                limit: 4,
            }]
        );
    }

    #[test]
    fn test_full_page_keeps_wallet_open() {
        let a = wallet("BTC");
        let history: Vec<_> = (0..10).map(|i| record(&format!("a{i}"), 100 - i, None)).collect();
        let histories = Histories(HashMap::from([(a.clone(), history)]));

        let mut aggregator = RecordAggregator::new(3);
        aggregator.set_wallets(vec![a.clone()]);
        assert_eq!(load_next(&mut aggregator, &histories), 3);
        assert!(!aggregator.all_shown());

        let requests = aggregator.fetch_data_list();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].from_hash.as_deref(), Some("a3"));
        assert_eq!(requests[0].limit, 3);
    }

    #[test]
    fn test_merge_never_skips_unfetched_newer_records() {
        // `b` runs dry between pages while `a` still has records staged.
        let a = wallet("BTC");
        let b = wallet("ETH");
        let history_a: Vec<_> = (0..6).map(|i| record(&format!("a{i}"), 100 - i * 10, None)).collect();
        let history_b = vec![record("b0", 95, None), record("b1", 55, None), record("b2", 5, None)];
        let histories = Histories(HashMap::from([(a.clone(), history_a), (b.clone(), history_b)]));

        let mut aggregator = RecordAggregator::new(2);
        aggregator.set_wallets(vec![a, b]);
        while load_next(&mut aggregator, &histories) > 0 {
            assert_feed_invariants(&aggregator);
        }

        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a0", "b0", "a1", "a2", "a3", "a4", "b1", "a5", "b2"]);
        assert!(aggregator.all_shown());
    }

    #[test]
    fn test_random_histories_merge_in_order() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let wallet_count = rng.random_range(1..5);
            let page_size = rng.random_range(1..7);
            let mut histories = HashMap::new();
            let mut total = 0;
            for w in 0..wallet_count {
                let len = rng.random_range(0..15);
                let mut history: Vec<_> = (0..len)
                    .map(|i| record(&format!("w{w}-{i}"), rng.random_range(0..40), None))
                    .collect();
                history.sort_by(|x, y| y.timestamp.cmp(&x.timestamp).then_with(|| x.hash.cmp(&y.hash)));
                total += history.len();
                histories.insert(wallet("BTC"), history);
            }
            let histories = Histories(histories);

            let mut aggregator = RecordAggregator::new(page_size);
            aggregator.set_wallets(histories.0.keys().cloned().collect());

            let mut previous_len = 0;
            loop {
                let inserted = load_next(&mut aggregator, &histories);
                assert!(aggregator.items_count() >= previous_len);
                assert!(inserted <= page_size);
                previous_len = aggregator.items_count();
                assert_feed_invariants(&aggregator);
                if inserted == 0 {
                    break;
                }
            }
            assert_eq!(aggregator.items_count(), total);
            assert!(aggregator.all_shown());
        }
    }

    #[test]
    fn test_all_shown_requires_every_wallet_to_return_short_page() {
        let a = wallet("BTC");
        let b = wallet("ETH");
        let mut aggregator = RecordAggregator::new(2);
        aggregator.set_wallets(vec![a.clone(), b.clone()]);
        assert!(!aggregator.all_shown());

        let requests = aggregator.fetch_data_list();
        assert_eq!(requests.len(), 2);
        aggregator.handle_fetched_records(HashMap::from([
            (a.clone(), vec![]),
            (b.clone(), vec![record("b1", 3, None), record("b2", 2, None), record("b3", 1, None)]),
        ]));
        assert!(!aggregator.all_shown());
        assert_eq!(aggregator.increase_page(), 2);
        assert!(!aggregator.all_shown());

        let requests = aggregator.fetch_data_list();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].wallet, b);
        aggregator.handle_fetched_records(HashMap::from([(b.clone(), vec![])]));
        assert_eq!(aggregator.increase_page(), 1);
        assert!(aggregator.all_shown());
    }

    #[test]
    fn test_updated_record_replaces_in_place() {
        let a = wallet("BTC");
        let mut aggregator = RecordAggregator::new(5);
        aggregator.set_wallets(vec![a.clone()]);
        aggregator.fetch_data_list();
        aggregator.handle_fetched_records(HashMap::from([(
            a.clone(),
            vec![record("a1", 30, None), record("a2", 20, None), record("a3", 10, None)],
        )]));
        aggregator.increase_page();

        assert!(!aggregator.handle_updated_records(vec![record("a2", 20, None)], &a));

        assert!(aggregator.handle_updated_records(vec![record("a2", 20, Some(7))], &a));
        assert_eq!(aggregator.items_count(), 3);
        assert_eq!(aggregator.item_for_index(1).unwrap().record.block_height, Some(7));
    }

    #[test]
    fn test_updated_record_with_new_timestamp_moves() {
        let a = wallet("BTC");
        let mut aggregator = RecordAggregator::new(5);
        aggregator.set_wallets(vec![a.clone()]);
        aggregator.fetch_data_list();
        aggregator.handle_fetched_records(HashMap::from([(
            a.clone(),
            vec![record("a1", 30, None), record("a2", 20, None)],
        )]));
        aggregator.increase_page();

        assert!(aggregator.handle_updated_records(vec![record("a2", 40, None)], &a));
        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a2", "a1"]);
    }

    #[test]
    fn test_new_records_insert_inside_visible_range_only() {
        let a = wallet("BTC");
        let history: Vec<_> = (0..6).map(|i| record(&format!("a{i}"), 100 - i * 10, None)).collect();
        let histories = Histories(HashMap::from([(a.clone(), history)]));
        let mut aggregator = RecordAggregator::new(2);
        aggregator.set_wallets(vec![a.clone()]);
        load_next(&mut aggregator, &histories);
        assert_eq!(aggregator.items_count(), 2);

        // Just broadcast: newest of all.
        assert!(aggregator.handle_updated_records(vec![record("fresh", 200, None)], &a));
        assert_eq!(aggregator.item_for_index(0).unwrap().record.hash, "fresh");

        // Older than the visible tail: staged for a later page.
        assert!(!aggregator.handle_updated_records(vec![record("late", 75, None)], &a));
        assert_eq!(aggregator.items_count(), 3);

        while load_next(&mut aggregator, &histories) > 0 {}
        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(hashes, vec!["fresh", "a0", "a1", "a2", "late", "a3", "a4", "a5"]);
        assert_feed_invariants(&aggregator);
    }

    #[test]
    fn test_live_records_past_last_fetch_keep_feed_ordered() {
        let a = wallet("BTC");
        let mut history: Vec<_> = (0..6).map(|i| record(&format!("a{i}"), 100 - i * 10, None)).collect();
        let late = vec![record("late1", 45, None), record("late2", 44, None)];
        let mut aggregator = RecordAggregator::new(2);
        aggregator.set_wallets(vec![a.clone()]);
        load_next(&mut aggregator, &Histories(HashMap::from([(a.clone(), history.clone())])));
        assert_eq!(aggregator.items_count(), 2);

        // The sync engine stored both records before broadcasting them.
        history.extend(late.clone());
        let histories = Histories(HashMap::from([(a.clone(), history)]));
        assert!(!aggregator.handle_updated_records(late, &a));

        while load_next(&mut aggregator, &histories) > 0 {
            assert_feed_invariants(&aggregator);
        }
        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a0", "a1", "a2", "a3", "a4", "a5", "late1", "late2"]);
        assert!(aggregator.all_shown());
    }

    #[test]
    fn test_held_live_records_survive_fetches_that_miss_them() {
        let a = wallet("BTC");
        let history: Vec<_> = (0..6).map(|i| record(&format!("a{i}"), 100 - i * 10, None)).collect();
        let histories = Histories(HashMap::from([(a.clone(), history)]));
        let mut aggregator = RecordAggregator::new(2);
        aggregator.set_wallets(vec![a.clone()]);
        load_next(&mut aggregator, &histories);

        // Fetches never return these, e.g. they raced an in-flight page.
        assert!(!aggregator.handle_updated_records(
            vec![record("late1", 45, None), record("late2", 44, None), record("mid", 65, None)],
            &a,
        ));
        assert_eq!(aggregator.fetch_data_list()[0].limit, 2);

        let requests = aggregator.fetch_data_list();
        aggregator.handle_fetched_records(histories.serve(&requests));
        while load_next(&mut aggregator, &histories) > 0 {
            assert_feed_invariants(&aggregator);
        }
        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(
            hashes,
            vec!["a0", "a1", "a2", "a3", "mid", "a4", "a5", "late1", "late2"]
        );
        assert!(aggregator.all_shown());
    }

    #[test]
    fn test_random_live_updates_between_pages_keep_feed_ordered() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let wallet_count = rng.random_range(1..4);
            let page_size = rng.random_range(1..6);
            let mut histories = HashMap::new();
            for w in 0..wallet_count {
                let len = rng.random_range(0..12);
                let mut history: Vec<_> = (0..len)
                    .map(|i| record(&format!("w{w}-{i}"), rng.random_range(0..40), None))
                    .collect();
                sort_history(&mut history);
                histories.insert(wallet("BTC"), history);
            }
            let mut histories = Histories(histories);
            let wallets: Vec<Wallet> = histories.0.keys().cloned().collect();

            let mut aggregator = RecordAggregator::new(page_size);
            aggregator.set_wallets(wallets.clone());

            for step in 0..30 {
                let target = wallets[rng.random_range(0..wallets.len())].clone();
                let Some(history) = histories.0.get_mut(&target) else {
                    continue;
                };
                match rng.random_range(0..3) {
                    // A new record, stored by the sync engine and broadcast.
                    0 => {
                        let fresh = record(&format!("live-{step}"), rng.random_range(0..45), None);
                        history.push(fresh.clone());
                        sort_history(history);
                        aggregator.handle_updated_records(vec![fresh], &target);
                    }
                    // An existing record picked up a block height.
                    1 if !history.is_empty() => {
                        let index = rng.random_range(0..history.len());
                        history[index].block_height = Some(rng.random_range(1..1000));
                        aggregator.handle_updated_records(vec![history[index].clone()], &target);
                    }
                    _ => {
                        load_next(&mut aggregator, &histories);
                    }
                }
                assert_feed_invariants(&aggregator);
            }

            while load_next(&mut aggregator, &histories) > 0 {
                assert_feed_invariants(&aggregator);
            }
            let total: usize = histories.0.values().map(Vec::len).sum();
            assert_eq!(aggregator.items_count(), total);
            assert!(aggregator.all_shown());
            for item in aggregator.items() {
                let stored = histories.0[&item.wallet]
                    .iter()
                    .find(|r| r.hash == item.record.hash)
                    .unwrap();
                assert_eq!(&item.record, stored);
            }
        }
    }

    #[test]
    fn test_overlapping_fetch_replaces_instead_of_duplicating() {
        let a = wallet("BTC");
        let mut aggregator = RecordAggregator::new(1);
        aggregator.set_wallets(vec![a.clone()]);
        aggregator.fetch_data_list();
        assert!(!aggregator.handle_fetched_records(HashMap::from([(
            a.clone(),
            vec![record("a1", 30, None), record("a2", 20, None)],
        )])));
        aggregator.increase_page();

        aggregator.fetch_data_list();
        let changed = aggregator.handle_fetched_records(HashMap::from([(
            a.clone(),
            vec![record("a1", 30, Some(3)), record("a2", 20, Some(2)), record("a3", 10, None)],
        )]));
        assert!(changed);
        assert_eq!(aggregator.item_for_index(0).unwrap().record.block_height, Some(3));

        while aggregator.increase_page() > 0 {}
        let hashes: Vec<&str> = aggregator.items().iter().map(|i| i.record.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a1", "a2", "a3"]);
        assert_eq!(aggregator.item_for_index(1).unwrap().record.block_height, Some(2));
    }

    #[test]
    fn test_updates_for_unselected_wallet_are_ignored() {
        let a = wallet("BTC");
        let stranger = wallet("DOGE");
        let mut aggregator = RecordAggregator::new(2);
        aggregator.set_wallets(vec![a]);
        assert!(!aggregator.handle_updated_records(vec![record("x", 1, None)], &stranger));
        assert_eq!(aggregator.items_count(), 0);
    }

    #[test]
    fn test_fully_loaded_feed_accepts_old_records() {
        let a = wallet("BTC");
        let mut aggregator = RecordAggregator::new(5);
        aggregator.set_wallets(vec![a.clone()]);
        aggregator.fetch_data_list();
        aggregator.handle_fetched_records(HashMap::from([(a.clone(), vec![record("a1", 30, None)])]));
        aggregator.increase_page();
        assert!(aggregator.all_shown());

        assert!(aggregator.handle_updated_records(vec![record("old", 1, None)], &a));
        assert_eq!(aggregator.item_for_index(1).unwrap().record.hash, "old");
    }

    #[test]
    fn test_pending_indexes_cover_rows_above_floor() {
        let a = wallet("BTC");
        let b = wallet("ETH");
        let mut aggregator = RecordAggregator::new(10);
        aggregator.set_wallets(vec![a.clone(), b.clone()]);
        aggregator.fetch_data_list();
        aggregator.handle_fetched_records(HashMap::from([
            (
                a.clone(),
                vec![record("a1", 50, None), record("a2", 40, Some(99)), record("a3", 30, Some(90))],
            ),
            (b.clone(), vec![record("b1", 45, Some(99))]),
        ]));
        aggregator.increase_page();

        // Feed: a1(50) b1(45) a2(40) a3(30)
        assert_eq!(aggregator.item_indexes_for_pending(&a, 95), vec![2]);
        assert_eq!(aggregator.item_indexes_for_pending(&a, 0), vec![2, 3]);
        assert_eq!(aggregator.item_indexes_for_pending(&b, 95), vec![1]);
    }

    #[test]
    fn test_timestamp_indexes_match_asset_and_time() {
        let a = wallet("BTC");
        let b = wallet("ETH");
        let mut aggregator = RecordAggregator::new(10);
        aggregator.set_wallets(vec![a.clone(), b.clone()]);
        aggregator.fetch_data_list();
        aggregator.handle_fetched_records(HashMap::from([
            (a.clone(), vec![record("a1", 50, None), record("a2", 40, None)]),
            (b.clone(), vec![record("b1", 50, None)]),
        ]));
        aggregator.increase_page();

        assert_eq!(aggregator.item_indexes_for_timestamp(&a.asset, 50), vec![0]);
        assert_eq!(aggregator.item_indexes_for_timestamp(&b.asset, 50), vec![1]);
        assert!(aggregator.item_indexes_for_timestamp(&a.asset, 45).is_empty());
    }

    #[test]
    fn test_set_wallets_discards_removed_wallets() {
        let a = wallet("BTC");
        let b = wallet("ETH");
        let mut aggregator = RecordAggregator::new(10);
        aggregator.set_wallets(vec![a.clone(), b.clone()]);
        aggregator.fetch_data_list();
        aggregator.handle_fetched_records(HashMap::from([
            (a.clone(), vec![record("a1", 50, None)]),
            (b.clone(), vec![record("b1", 40, None)]),
        ]));
        aggregator.increase_page();
        assert_eq!(aggregator.items_count(), 2);

        aggregator.set_wallets(vec![a.clone(), a.clone()]);
        assert_eq!(aggregator.wallets(), &[a.clone()]);
        assert_eq!(aggregator.items_count(), 1);
        assert!(!aggregator.is_selected(&b));
        assert!(!aggregator.all_shown());

        aggregator.reset();
        assert_eq!(aggregator.items_count(), 0);
        assert_eq!(aggregator.fetch_data_list()[0].from_hash, None);
    }
}
