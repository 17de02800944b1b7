//! Indexer configuration.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::fetch::TrackedContract;

/// Configuration for an indexer instance.
///
/// Values come from the deployment's environment/config layer; the engine
/// only validates and consumes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// The contracts whose logs are indexed.
    pub contracts: Vec<TrackedContract>,
    /// First block to index on a fresh deployment (ignored once a
    /// checkpoint exists).
    pub start_block: u64,
    /// Blocks behind head considered safe from reorganization.
    /// 64 is the usual choice for L2s anchored to Ethereum.
    pub confirmation_depth: u64,
    /// Maximum blocks fetched per batch.
    pub batch_size: u64,
    /// Poll cadence when caught up (milliseconds).
    pub poll_interval_ms: u64,
    /// How many heights below the checkpoint each reorg scan examines.
    pub reorg_check_depth: u64,
    /// Cap for the exponential error backoff (milliseconds).
    pub max_backoff_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            contracts: vec![],
            start_block: 0,
            confirmation_depth: 64,
            batch_size: 500,
            poll_interval_ms: 2000,
            reorg_check_depth: 10,
            max_backoff_ms: 30_000,
        }
    }
}

impl IndexerConfig {
    /// Fatal-at-startup validation; failures abort process boot.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.contracts.is_empty() {
            return Err(IndexerError::Config("no tracked contracts".into()));
        }
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(IndexerError::Config("poll_interval_ms must be nonzero".into()));
        }
        if self.reorg_check_depth == 0 {
            return Err(IndexerError::Config("reorg_check_depth must be nonzero".into()));
        }
        Ok(())
    }

    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::default()
    }
}

/// Fluent builder for [`IndexerConfig`].
#[derive(Default)]
pub struct IndexerConfigBuilder {
    config: IndexerConfig,
}

impl IndexerConfigBuilder {
    pub fn contract(mut self, contract: TrackedContract) -> Self {
        self.config.contracts.push(contract);
        self
    }

    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn reorg_check_depth(mut self, depth: u64) -> Self {
        self.config.reorg_check_depth = depth;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> IndexerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::ContractKind;

    #[test]
    fn defaults() {
        let cfg = IndexerConfig::default();
        assert_eq!(cfg.confirmation_depth, 64);
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.reorg_check_depth, 10);
    }

    #[test]
    fn validate_requires_contracts() {
        assert!(IndexerConfig::default().validate().is_err());

        let cfg = IndexerConfig::builder()
            .contract(TrackedContract::new(ContractKind::Governance, "0xgov"))
            .build();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerConfig::builder()
            .contract(TrackedContract::new(ContractKind::Market, "0xmkt"))
            .start_block(1_000_000)
            .confirmation_depth(32)
            .batch_size(100)
            .build();
        assert_eq!(cfg.start_block, 1_000_000);
        assert_eq!(cfg.confirmation_depth, 32);
        assert_eq!(cfg.batch_size, 100);
    }
}
