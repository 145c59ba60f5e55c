use crate::cache::BlockMeta;
use txfeed_sdk::objects::ConfirmationState;

/// Classifies a transaction mined at `block_height` against the wallet's
/// chain tip and confirmation threshold.
///
/// Depth is `tip - block_height + 1`. A tip that is unknown or below the
/// transaction's block (the sync engine lags or the chain reorganized)
/// counts as depth 1, since the including block is itself a tip.
pub fn confirmation_state(block_height: Option<u64>, meta: BlockMeta) -> ConfirmationState {
    let Some(height) = block_height else {
        return ConfirmationState::Pending;
    };
    let threshold = meta.confirmation_threshold.max(1);
    let depth = match meta.last_block_height {
        Some(tip) if tip >= height => tip - height + 1,
        _ => 1,
    };
    if depth >= u64::from(threshold) {
        ConfirmationState::Confirmed
    } else {
        ConfirmationState::Confirming {
            depth: u32::try_from(depth).unwrap_or(u32::MAX),
            threshold,
        }
    }
}
