//! agoraindex-core — reorg-safe indexing engine for the Agora governance and
//! market contracts.
//!
//! # Architecture
//!
//! ```text
//! Indexer (loop) ──→ IndexerHandle (pause / resume / stop / status)
//!     ├── ChainClient      (head, headers, logs)
//!     ├── fetch            (concurrent multi-contract fetch + ordered merge)
//!     ├── decode           (per-contract event shapes → DomainEvent)
//!     ├── ReorgDetector    (hash comparison, re-entrant convergence)
//!     └── Store backend    (memory / SQLite via agoraindex-storage)
//! ```
//!
//! The engine only ever processes blocks at least `confirmation_depth` behind
//! the observed head, keeps a persisted checkpoint for crash recovery, and
//! soft-invalidates rows orphaned by chain reorganizations instead of
//! deleting them.

pub mod aggregates;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod fetch;
pub mod indexer;
pub mod reorg;
pub mod store;
pub mod types;

pub use aggregates::{MarketStats, ParentAggregate, ProposalTally, SuggestionTally};
pub use checkpoint::Checkpoint;
pub use client::ChainClient;
pub use config::{IndexerConfig, IndexerConfigBuilder};
pub use decode::ContractKind;
pub use error::IndexerError;
pub use events::{DomainEvent, EventKind, ParentId, VoteSupport};
pub use fetch::TrackedContract;
pub use indexer::{Indexer, IndexerHandle, IndexerStatus, IterationOutcome, LoopState};
pub use reorg::ReorgDetector;
pub use store::{MemoryStore, ReorgSweep, Store};
pub use types::{BlockHeader, EventMeta, IndexedEvent, RawLog, Validity};
