//! agoraindex-storage — persistence backends for the Agora event indexer.
//!
//! Backends:
//! - `MemoryStore` (re-exported from `agoraindex-core`) — tests, ephemeral runs
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
