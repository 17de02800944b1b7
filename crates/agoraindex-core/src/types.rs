//! Shared types for the indexing pipeline.

use serde::{Deserialize, Serialize};

use crate::events::DomainEvent;

// ─── BlockHeader ──────────────────────────────────────────────────────────────

/// A minimal view of a block — enough to gate on confirmations and to compare
/// stored hashes against the chain's current history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: u64,
}

// ─── RawLog ───────────────────────────────────────────────────────────────────

/// A raw contract log as returned by the chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Emitting contract address (`0x…`).
    pub address: String,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed fields, hex (`0x…`).
    pub data: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Log index within the block.
    pub log_index: u32,
    /// Block number.
    pub block_number: u64,
    /// Hash of the containing block.
    pub block_hash: String,
}

impl RawLog {
    /// The event signature hash (`topics[0]`), if present.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

// ─── Validity ─────────────────────────────────────────────────────────────────

/// Soft-delete state of a persisted row.
///
/// Readers must only ever see `Live` rows; store helpers apply this filter so
/// that no query can forget it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    /// Row belongs to the canonical chain.
    Live,
    /// Row was invalidated by a reorg. Never flipped back — a corrected
    /// re-index creates a new row instead.
    Reorged,
}

impl Validity {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

// ─── EventMeta ────────────────────────────────────────────────────────────────

/// Provenance embedded in every persisted domain record.
///
/// Identity key is `(tx_hash, log_index)` — globally unique, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub block_hash: String,
    pub block_timestamp: u64,
    pub validity: Validity,
    /// Unix timestamp of the reorg sweep that invalidated this row.
    pub reorged_at: Option<i64>,
}

impl EventMeta {
    /// Meta for a freshly decoded log (always `Live`).
    pub fn from_log(log: &RawLog, block_timestamp: u64) -> Self {
        Self {
            tx_hash: log.tx_hash.clone(),
            log_index: log.log_index,
            block_number: log.block_number,
            block_hash: log.block_hash.clone(),
            block_timestamp,
            validity: Validity::Live,
            reorged_at: None,
        }
    }

    /// The idempotency key for inserts.
    pub fn identity(&self) -> (String, u32) {
        (self.tx_hash.clone(), self.log_index)
    }
}

// ─── IndexedEvent ─────────────────────────────────────────────────────────────

/// A decoded domain event together with its provenance — the unit the store
/// persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEvent {
    pub meta: EventMeta,
    pub event: DomainEvent,
}
