//! Configuration types for the feed.
//!
//! These are the validated runtime types. Loading and parsing config files
//! is handled by the daemon crate.

mod config_store;
mod feed;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use feed::{DEFAULT_FETCH_TIMEOUT, FeedConfig, WalletConfig};
