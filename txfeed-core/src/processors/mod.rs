//! Event processors of the feed.
//!
//! - `FeedOrchestrator`: receives `FeedEvent`s, config changes and its own
//!   fetch/rate completions, emits `FeedUpdate`s
//! - `sources`: the collaborator traits it loads records and rates through

pub mod feed_orchestrator;
pub mod sources;

pub use feed_orchestrator::FeedOrchestrator;
pub use sources::{FetchError, RateError, RateResolver, RecordFetcher, fetch_batch};
