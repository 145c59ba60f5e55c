//! Multi-wallet transaction aggregation and pagination.

pub mod item;
pub mod paginator;

pub use item::{FetchRequest, TransactionItem};
pub use paginator::{DEFAULT_PAGE_SIZE, RecordAggregator};
