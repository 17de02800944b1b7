//! Reorg detection and recovery.
//!
//! Detection compares block hashes recorded alongside stored events against
//! the chain's current view, scanning backward from the checkpoint for a
//! bounded window. The scan returns the *first* (most recent) mismatch, so a
//! single pass may not unwind a multi-block divergence — the indexing loop
//! re-runs detection every iteration until it reports clean, which converges
//! in at most `check_depth` extra passes. That re-entrant behavior is load-
//! bearing; do not "fix" the scan to hunt for the earliest mismatch.

use crate::checkpoint::Checkpoint;
use crate::client::ChainClient;
use crate::error::IndexerError;
use crate::store::{ReorgSweep, Store};

/// Scans recent history for rewritten blocks.
pub struct ReorgDetector {
    /// How many heights below the checkpoint to examine per pass.
    check_depth: u64,
}

impl ReorgDetector {
    pub fn new(check_depth: u64) -> Self {
        Self { check_depth }
    }

    /// Compare stored block hashes against the chain, newest first.
    ///
    /// Heights with no live stored events are skipped (nothing to compare).
    /// Returns the first height where the hashes differ, or `None` if the
    /// whole window matches.
    pub async fn scan(
        &self,
        client: &dyn ChainClient,
        store: &dyn Store,
        last_indexed_block: u64,
    ) -> Result<Option<u64>, IndexerError> {
        let lowest = last_indexed_block.saturating_sub(self.check_depth.saturating_sub(1));

        let mut height = last_indexed_block;
        loop {
            if let Some(stored) = store.stored_block_hash(height).await? {
                let current = client
                    .block_by_number(height)
                    .await?
                    .map(|header| header.hash);
                match current {
                    Some(hash) if hash == stored => {}
                    // A different hash, or a block the node no longer has,
                    // both mean our history at this height was rewritten.
                    _ => {
                        tracing::warn!(height, stored, "stored block hash diverges from chain");
                        return Ok(Some(height));
                    }
                }
            }
            if height == lowest || height == 0 {
                break;
            }
            height -= 1;
        }
        Ok(None)
    }
}

/// Recover from a divergence at height `divergence`.
///
/// Soft-invalidates every live row with `block_number >= divergence`, rolls
/// the checkpoint back to `divergence - 1`, and recomputes the aggregates of
/// every parent the sweep touched — in one store transaction. The sweep
/// erases the detector's evidence (swept heights have no live rows left to
/// compare), so a partially committed recovery could never be re-detected; a
/// crash here must leave either the full recovery or none of it.
pub async fn handle_reorg(
    client: &dyn ChainClient,
    store: &dyn Store,
    divergence: u64,
    chain_head: u64,
) -> Result<ReorgSweep, IndexerError> {
    let rollback_to = divergence.saturating_sub(1);
    // Reads only; rollback_to is below the divergence, untouched by the sweep.
    let rollback_hash = match client.block_by_number(rollback_to).await? {
        Some(header) => header.hash,
        None => store
            .stored_block_hash(rollback_to)
            .await?
            .unwrap_or_default(),
    };

    let now = chrono::Utc::now().timestamp();
    let sweep = store
        .recover_reorg(
            divergence,
            now,
            Checkpoint::new(rollback_to, rollback_hash, Some(chain_head)),
        )
        .await?;

    tracing::warn!(
        divergence,
        rollback_to,
        invalidated = sweep.total(),
        parents = sweep.parents.len(),
        "reorg handled"
    );
    Ok(sweep)
}
