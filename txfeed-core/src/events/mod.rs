//! Event system of the feed.
//!
//! # Event Flow
//!
//! 1. Sync engines, the rate service and the UI push `FeedEvent`s through
//!    a `FeedHandle`
//! 2. Configuration changes arrive through a `ConfigWatcher`
//! 3. `FeedOrchestrator` applies them one at a time to the aggregator and
//!    metadata cache
//! 4. `FeedOrchestrator` emits `FeedUpdate`s to the display boundary

pub mod channels;
pub mod types;

pub use channels::{
    feed_event_channel, feed_update_channel, FeedClosed, FeedEventReceiver, FeedEventSender,
    FeedHandle, FeedUpdateReceiver, FeedUpdateSender, DEFAULT_CHANNEL_BUFFER,
};

pub use types::{FeedEvent, FeedUpdate, Projection, ProjectionChange};
