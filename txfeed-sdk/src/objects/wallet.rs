//! Wallet identity and currency codes.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors produced when parsing asset or currency codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeParseError {
    #[error("code must not be empty")]
    Empty,
    #[error("code {0:?} contains characters other than ASCII letters, digits, '-' or '.'")]
    InvalidCharacter(String),
}

fn normalize_code(raw: &str) -> Result<CompactString, CodeParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CodeParseError::Empty);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(CodeParseError::InvalidCharacter(trimmed.to_string()));
    }
    Ok(CompactString::from(trimmed.to_ascii_uppercase()))
}

/// Ticker of a synced asset, e.g. `BTC` or `USDT-ERC20`.
///
/// Always stored uppercase so `btc` and `BTC` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetCode(CompactString);

impl AssetCode {
    pub fn new(raw: &str) -> Result<Self, CodeParseError> {
        normalize_code(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetCode {
    type Error = CodeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AssetCode> for String {
    fn from(value: AssetCode) -> Self {
        value.0.into_string()
    }
}

impl std::fmt::Display for AssetCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fiat currency the feed values transactions in, e.g. `USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(CompactString);

impl CurrencyCode {
    pub fn new(raw: &str) -> Result<Self, CodeParseError> {
        normalize_code(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CodeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0.into_string()
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One synced (account, asset) pair acting as a transaction source.
///
/// Identity is the explicit `(account_id, asset)` key, so two `Wallet`
/// values built from the same configuration entry are interchangeable as
/// map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Wallet {
    pub account_id: Uuid,
    pub asset: AssetCode,
}

impl Wallet {
    pub fn new(account_id: Uuid, asset: AssetCode) -> Self {
        Self { account_id, asset }
    }
}

impl std::fmt::Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account_id, self.asset)
    }
}
