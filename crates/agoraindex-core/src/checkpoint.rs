//! The persisted indexing cursor.
//!
//! A single logical row marking how far the projection has advanced. It is
//! written only by the indexing loop — after an atomic batch commit, or
//! rolled back during reorg recovery. Outside rollback,
//! `last_indexed_block` never decreases.

use serde::{Deserialize, Serialize};

/// Persisted indexing progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last block whose events were fully committed.
    pub last_indexed_block: u64,
    /// Hash of that block, for divergence checks on restart.
    pub last_indexed_hash: String,
    /// Chain head observed when the checkpoint was written.
    pub chain_head_block: Option<u64>,
    /// Unix timestamp of the write.
    pub updated_at: i64,
}

impl Checkpoint {
    /// Checkpoint stamped with the current wall clock.
    pub fn new(
        last_indexed_block: u64,
        last_indexed_hash: impl Into<String>,
        chain_head_block: Option<u64>,
    ) -> Self {
        Self {
            last_indexed_block,
            last_indexed_hash: last_indexed_hash.into(),
            chain_head_block,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// First block the next batch should cover.
    pub fn next_block(&self) -> u64 {
        self.last_indexed_block + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_block_is_cursor_plus_one() {
        let cp = Checkpoint::new(1004, "0xb1004", Some(1100));
        assert_eq!(cp.next_block(), 1005);
        assert_eq!(cp.chain_head_block, Some(1100));
    }
}
