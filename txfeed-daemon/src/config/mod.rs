//! Configuration module for the replay daemon.
//!
//! Reads `txfeed.toml`, applies CLI overrides, validates the result and
//! turns it into the core's `FeedConfig` plus the fixture and rate tables
//! the replay sources are built from.

pub mod file;

use crate::config::file::{FileConfig, RateEntry};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use txfeed_core::config::{FeedConfig, WalletConfig};
use txfeed_sdk::objects::Wallet;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to parse fixture {path}: {source}")]
    FixtureError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub feed: FeedConfig,
    /// Fixture file of each configured wallet, with resolved paths.
    pub fixtures: HashMap<Wallet, PathBuf>,
    pub rates: Vec<RateEntry>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    page_size_override: Option<usize>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, page_size_override: Option<usize>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            page_size_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|source| ConfigError::IoError {
                path: self.config_path.clone(),
                source,
            })?;
        let mut file_config: FileConfig = toml::from_str(&content)?;

        if let Some(page_size) = self.page_size_override {
            file_config.feed.page_size = page_size;
        }

        self.validate(&file_config)?;
        Ok(self.build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.feed.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "feed.page_size must be at least 1".to_string(),
            ));
        }
        if config.feed.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "feed.fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for entry in &config.wallets {
            if !seen.insert((entry.account_id, entry.asset.clone())) {
                return Err(ConfigError::ValidationError(format!(
                    "wallet {}/{} is configured twice",
                    entry.account_id, entry.asset
                )));
            }
        }
        Ok(())
    }

    fn build_loaded_config(&self, file_config: FileConfig) -> LoadedConfig {
        let base_dir = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut wallets = Vec::with_capacity(file_config.wallets.len());
        let mut fixtures = HashMap::with_capacity(file_config.wallets.len());
        for entry in file_config.wallets {
            let wallet = Wallet::new(entry.account_id, entry.asset);
            fixtures.insert(wallet.clone(), base_dir.join(entry.fixture));
            wallets.push(WalletConfig {
                wallet,
                confirmation_threshold: entry.confirmation_threshold,
                last_block_height: entry.last_block_height,
            });
        }

        let feed = FeedConfig {
            page_size: file_config.feed.page_size,
            fetch_timeout: Duration::from_secs(file_config.feed.fetch_timeout_secs),
            ..FeedConfig::new(wallets, file_config.feed.base_currency)
        };

        LoadedConfig {
            feed,
            fixtures,
            rates: file_config.rates,
        }
    }
}
