//! Read-only chain access consumed by the indexing engine.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{BlockHeader, RawLog};

/// Trait for the L2 chain's JSON-RPC surface the engine needs.
///
/// The engine never mutates the chain; implementations wrap an HTTP provider
/// in production and a scripted chain in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn head_block_number(&self) -> Result<u64, IndexerError>;

    /// Header for the block at `number`, or `None` if the node does not have it.
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError>;

    /// All logs emitted by `address` in `[from, to]` (inclusive).
    async fn logs(
        &self,
        address: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, IndexerError>;
}
