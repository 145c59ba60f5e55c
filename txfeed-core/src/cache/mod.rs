//! Metadata needed to turn stored transactions into display rows.

pub mod metadata;

pub use metadata::{BlockMeta, DEFAULT_CONFIRMATION_THRESHOLD, MetadataCache, RateKey};
