//! Event channel factories and handles.
//!
//! Provides factory functions for the feed's input and output channels and
//! a cloneable [`FeedHandle`] for collaborators that push events.

use super::types::{FeedEvent, FeedUpdate};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;
use txfeed_sdk::objects::{AssetCode, CurrencyCode, TransactionRecord, Wallet};

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for FeedEvent events.
pub type FeedEventSender = mpsc::Sender<FeedEvent>;
/// Receiver handle for FeedEvent events.
pub type FeedEventReceiver = mpsc::Receiver<FeedEvent>;

/// Sender handle for FeedUpdate events.
pub type FeedUpdateSender = mpsc::Sender<FeedUpdate>;
/// Receiver handle for FeedUpdate events.
pub type FeedUpdateReceiver = mpsc::Receiver<FeedUpdate>;

/// Create a new FeedEvent channel.
///
/// Multiple senders can be cloned from the returned sender; the
/// orchestrator is the only receiver.
pub fn feed_event_channel() -> (FeedEventSender, FeedEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new FeedUpdate channel.
pub fn feed_update_channel() -> (FeedUpdateSender, FeedUpdateReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// The orchestrator has stopped and no longer accepts events.
#[derive(Debug, Error)]
#[error("feed orchestrator is no longer running")]
pub struct FeedClosed;

/// Cloneable handle used by sync engines, the rate service and the UI to
/// push events into the feed.
#[derive(Clone)]
pub struct FeedHandle {
    events: FeedEventSender,
}

impl FeedHandle {
    pub fn new(events: FeedEventSender) -> Self {
        Self { events }
    }

    pub async fn send(&self, event: FeedEvent) -> Result<(), FeedClosed> {
        self.process(event).await
    }

    pub async fn load_next(&self) -> Result<(), FeedClosed> {
        self.send(FeedEvent::LoadNext).await
    }

    pub async fn select_wallet(&self, wallet: Option<Wallet>) -> Result<(), FeedClosed> {
        self.send(FeedEvent::SelectWallet(wallet)).await
    }

    pub async fn records_changed(
        &self,
        wallet: Wallet,
        records: Vec<TransactionRecord>,
    ) -> Result<(), FeedClosed> {
        self.send(FeedEvent::RecordsChanged { wallet, records }).await
    }

    pub async fn chain_tip_changed(&self, wallet: Wallet, height: u64) -> Result<(), FeedClosed> {
        self.send(FeedEvent::ChainTipChanged { wallet, height }).await
    }

    pub async fn rate_resolved(
        &self,
        asset: AssetCode,
        currency: CurrencyCode,
        timestamp: i64,
        rate: Decimal,
    ) -> Result<(), FeedClosed> {
        self.send(FeedEvent::RateResolved {
            asset,
            currency,
            timestamp,
            rate,
        })
        .await
    }

    pub async fn connectivity_restored(&self) -> Result<(), FeedClosed> {
        self.send(FeedEvent::ConnectivityRestored).await
    }

    pub async fn refresh(&self) -> Result<(), FeedClosed> {
        self.send(FeedEvent::Refresh).await
    }

    pub async fn select_item(&self, index: usize) -> Result<(), FeedClosed> {
        self.send(FeedEvent::SelectItem(index)).await
    }
}

/// Delivers an event to the orchestrator's queue. The event is applied
/// later, on the orchestrator task.
impl Processor<FeedEvent> for FeedHandle {
    type Output = ();
    type Error = FeedClosed;

    async fn process(&self, event: FeedEvent) -> Result<(), FeedClosed> {
        self.events.send(event).await.map_err(|_| FeedClosed)
    }
}
