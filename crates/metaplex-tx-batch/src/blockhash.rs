use crate::{config::BLOCKHASH_VALIDITY_SLOTS, Connection, ConnectionError};
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash};
use tracing::debug;

/// A recent blockhash together with the slot observed when it was fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashSnapshot {
    pub blockhash: Hash,
    pub slot: u64,
}

impl BlockhashSnapshot {
    pub fn new(blockhash: Hash, slot: u64) -> Self {
        Self { blockhash, slot }
    }

    /// True once `slot` is at or beyond the end of this blockhash's validity window
    pub fn is_stale_at(&self, slot: u64) -> bool {
        slot >= self.slot.saturating_add(BLOCKHASH_VALIDITY_SLOTS)
    }
}

/// Fetch the current slot and a recent blockhash concurrently
pub async fn fetch_blockhash_snapshot<C: Connection + ?Sized>(
    connection: &C,
    commitment: CommitmentConfig,
) -> Result<BlockhashSnapshot, ConnectionError> {
    let (slot, blockhash) = tokio::try_join!(
        connection.get_slot(commitment),
        connection.get_latest_blockhash(commitment),
    )?;
    debug!("Fetched blockhash {} at slot {}", blockhash, slot);
    Ok(BlockhashSnapshot { blockhash, slot })
}
