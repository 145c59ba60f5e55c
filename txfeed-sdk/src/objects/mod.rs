pub mod record;
pub mod view;
pub mod wallet;

pub use record::{TransactionDirection, TransactionRecord};
pub use view::{ConfirmationState, FiatValue, FilterOption, ViewItem};
pub use wallet::{AssetCode, CodeParseError, CurrencyCode, Wallet};
