//! SQLite projection store.
//!
//! Persists the checkpoint, the event rows, and the parent aggregates to a
//! single SQLite file. Uses `sqlx` with WAL mode for concurrent read
//! performance. `commit_batch` runs inserts, aggregate updates, and the
//! checkpoint advance in one transaction — the engine's atomicity guarantee
//! rests on that.
//!
//! Event payloads are stored as JSON alongside indexed identity columns;
//! reorged rows are retained with `validity = 1` and filtered out of every
//! read path.
//!
//! # Usage
//! ```rust,no_run
//! use agoraindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./agora.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use agoraindex_core::aggregates::ParentAggregate;
use agoraindex_core::checkpoint::Checkpoint;
use agoraindex_core::error::IndexerError;
use agoraindex_core::events::{DomainEvent, ParentId};
use agoraindex_core::store::{ReorgSweep, Store};
use agoraindex_core::types::{EventMeta, IndexedEvent, Validity};

/// SQLite-backed projection store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./agora.db"`) or a full SQLite
    /// URL (`"sqlite:./agora.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        // Singleton checkpoint row
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id                 INTEGER PRIMARY KEY CHECK (id = 1),
                last_indexed_block INTEGER NOT NULL,
                last_indexed_hash  TEXT    NOT NULL,
                chain_head_block   INTEGER,
                updated_at         INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        // The UNIQUE constraint is the idempotency key: replaying a range
        // after a crash turns duplicate inserts into no-ops.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                kind            TEXT    NOT NULL,
                parent_kind     TEXT    NOT NULL,
                parent_id       INTEGER NOT NULL,
                tx_hash         TEXT    NOT NULL,
                log_index       INTEGER NOT NULL,
                block_number    INTEGER NOT NULL,
                block_hash      TEXT    NOT NULL,
                block_timestamp INTEGER NOT NULL,
                validity        INTEGER NOT NULL DEFAULT 0,
                reorged_at      INTEGER,
                payload_json    TEXT    NOT NULL,
                UNIQUE (tx_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_block
             ON events (block_number) WHERE validity = 0;",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_parent
             ON events (parent_kind, parent_id) WHERE validity = 0;",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS aggregates (
                parent_kind TEXT    NOT NULL,
                parent_id   INTEGER NOT NULL,
                state_json  TEXT    NOT NULL,
                PRIMARY KEY (parent_kind, parent_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn parent_parts(parent: ParentId) -> (&'static str, i64) {
    match parent {
        ParentId::Proposal(id) => ("proposal", id as i64),
        ParentId::Suggestion(id) => ("suggestion", id as i64),
        ParentId::Market(id) => ("market", id as i64),
    }
}

fn validity_from_i64(v: i64) -> Validity {
    if v == 0 {
        Validity::Live
    } else {
        Validity::Reorged
    }
}

fn row_to_event(row: &SqliteRow) -> Result<IndexedEvent, IndexerError> {
    let payload: String = row.get("payload_json");
    let event: DomainEvent =
        serde_json::from_str(&payload).map_err(|e| IndexerError::Storage(e.to_string()))?;
    Ok(IndexedEvent {
        meta: EventMeta {
            tx_hash: row.get("tx_hash"),
            log_index: row.get::<i64, _>("log_index") as u32,
            block_number: row.get::<i64, _>("block_number") as u64,
            block_hash: row.get("block_hash"),
            block_timestamp: row.get::<i64, _>("block_timestamp") as u64,
            validity: validity_from_i64(row.get("validity")),
            reorged_at: row.get("reorged_at"),
        },
        event,
    })
}

// ─── Connection-level helpers (shared by pool and transaction paths) ──────────

async fn read_aggregate(
    conn: &mut SqliteConnection,
    parent: ParentId,
) -> Result<Option<ParentAggregate>, IndexerError> {
    let (kind, id) = parent_parts(parent);
    let row = sqlx::query("SELECT state_json FROM aggregates WHERE parent_kind = ? AND parent_id = ?")
        .bind(kind)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

    row.map(|r| {
        let state: String = r.get("state_json");
        serde_json::from_str(&state).map_err(|e| IndexerError::Storage(e.to_string()))
    })
    .transpose()
}

async fn write_aggregate(
    conn: &mut SqliteConnection,
    parent: ParentId,
    aggregate: &ParentAggregate,
) -> Result<(), IndexerError> {
    let (kind, id) = parent_parts(parent);
    let state =
        serde_json::to_string(aggregate).map_err(|e| IndexerError::Storage(e.to_string()))?;

    sqlx::query(
        "INSERT OR REPLACE INTO aggregates (parent_kind, parent_id, state_json)
         VALUES (?, ?, ?)",
    )
    .bind(kind)
    .bind(id)
    .bind(&state)
    .execute(&mut *conn)
    .await
    .map_err(|e| IndexerError::Storage(e.to_string()))?;
    Ok(())
}

/// Insert one row; on a fresh insert, apply the event to its parent's
/// aggregate. Returns whether the insert took.
async fn insert_one(
    conn: &mut SqliteConnection,
    event: &IndexedEvent,
) -> Result<bool, IndexerError> {
    let parent = event.event.parent();
    let (parent_kind, parent_id) = parent_parts(parent);
    let payload =
        serde_json::to_string(&event.event).map_err(|e| IndexerError::Storage(e.to_string()))?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO events
         (kind, parent_kind, parent_id, tx_hash, log_index,
          block_number, block_hash, block_timestamp, validity, reorged_at, payload_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)",
    )
    .bind(event.event.kind().as_str())
    .bind(parent_kind)
    .bind(parent_id)
    .bind(&event.meta.tx_hash)
    .bind(event.meta.log_index as i64)
    .bind(event.meta.block_number as i64)
    .bind(&event.meta.block_hash)
    .bind(event.meta.block_timestamp as i64)
    .bind(&payload)
    .execute(&mut *conn)
    .await
    .map_err(|e| IndexerError::Storage(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    let mut aggregate = read_aggregate(conn, parent)
        .await?
        .unwrap_or_else(|| ParentAggregate::empty_for(parent));
    aggregate.apply(&event.event);
    write_aggregate(conn, parent, &aggregate).await?;
    Ok(true)
}

async fn write_checkpoint(
    conn: &mut SqliteConnection,
    checkpoint: &Checkpoint,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT OR REPLACE INTO checkpoints
         (id, last_indexed_block, last_indexed_hash, chain_head_block, updated_at)
         VALUES (1, ?, ?, ?, ?)",
    )
    .bind(checkpoint.last_indexed_block as i64)
    .bind(&checkpoint.last_indexed_hash)
    .bind(checkpoint.chain_head_block.map(|b| b as i64))
    .bind(checkpoint.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| IndexerError::Storage(e.to_string()))?;
    Ok(())
}

/// Soft-invalidate every live row at or above `block`; reports what was
/// swept. Runs on the caller's connection so recovery can bundle it with the
/// checkpoint rollback and recomputation.
async fn sweep_rows(
    conn: &mut SqliteConnection,
    block: u64,
    at: i64,
) -> Result<ReorgSweep, IndexerError> {
    let rows = sqlx::query(
        "SELECT payload_json FROM events
         WHERE validity = 0 AND block_number >= ?",
    )
    .bind(block as i64)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| IndexerError::Storage(e.to_string()))?;

    let mut sweep = ReorgSweep::default();
    for row in &rows {
        let payload: String = row.get("payload_json");
        let event: DomainEvent =
            serde_json::from_str(&payload).map_err(|e| IndexerError::Storage(e.to_string()))?;
        *sweep.by_kind.entry(event.kind()).or_default() += 1;
        sweep.parents.insert(event.parent());
    }

    // reorged_at is set once and never cleared; rows already swept by an
    // earlier pass keep their original timestamp.
    sqlx::query(
        "UPDATE events SET validity = 1, reorged_at = ?
         WHERE validity = 0 AND block_number >= ?",
    )
    .bind(at)
    .bind(block as i64)
    .execute(&mut *conn)
    .await
    .map_err(|e| IndexerError::Storage(e.to_string()))?;

    Ok(sweep)
}

async fn recompute_one(
    conn: &mut SqliteConnection,
    parent: ParentId,
) -> Result<(), IndexerError> {
    let (kind, id) = parent_parts(parent);
    let rows = sqlx::query(
        "SELECT payload_json FROM events
         WHERE validity = 0 AND parent_kind = ? AND parent_id = ?
         ORDER BY id",
    )
    .bind(kind)
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| IndexerError::Storage(e.to_string()))?;

    let mut children = Vec::with_capacity(rows.len());
    for row in &rows {
        let payload: String = row.get("payload_json");
        let event: DomainEvent =
            serde_json::from_str(&payload).map_err(|e| IndexerError::Storage(e.to_string()))?;
        children.push(event);
    }

    let rebuilt = ParentAggregate::recompute(parent, children.iter());
    write_aggregate(conn, parent, &rebuilt).await
}

// ─── Store impl ───────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT last_indexed_block, last_indexed_hash, chain_head_block, updated_at
             FROM checkpoints WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| Checkpoint {
            last_indexed_block: r.get::<i64, _>("last_indexed_block") as u64,
            last_indexed_hash: r.get("last_indexed_hash"),
            chain_head_block: r
                .get::<Option<i64>, _>("chain_head_block")
                .map(|b| b as u64),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn set_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        write_checkpoint(&mut conn, &checkpoint).await?;
        debug!(block = checkpoint.last_indexed_block, "checkpoint saved");
        Ok(())
    }

    async fn stored_block_hash(&self, block: u64) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query(
            "SELECT block_hash FROM events
             WHERE validity = 0 AND block_number = ? LIMIT 1",
        )
        .bind(block as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.get::<String, _>("block_hash")))
    }

    async fn insert_event(&self, event: &IndexedEvent) -> Result<bool, IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let inserted = insert_one(&mut tx, event).await?;
        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(inserted)
    }

    async fn commit_batch(
        &self,
        events: &[IndexedEvent],
        checkpoint: Checkpoint,
    ) -> Result<u64, IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let mut inserted = 0;
        for event in events {
            if insert_one(&mut tx, event).await? {
                inserted += 1;
            }
        }
        write_checkpoint(&mut tx, &checkpoint).await?;

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(
            inserted,
            block = checkpoint.last_indexed_block,
            "batch committed"
        );
        Ok(inserted)
    }

    async fn mark_reorged_from(&self, block: u64, at: i64) -> Result<ReorgSweep, IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let sweep = sweep_rows(&mut tx, block, at).await?;
        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(block, invalidated = sweep.total(), "rows soft-invalidated");
        Ok(sweep)
    }

    async fn recover_reorg(
        &self,
        divergence: u64,
        at: i64,
        checkpoint: Checkpoint,
    ) -> Result<ReorgSweep, IndexerError> {
        // Sweep, checkpoint rollback, and recomputation commit together: a
        // committed sweep with the old checkpoint would be undetectable on
        // restart (the swept heights have no live rows left to compare).
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let sweep = sweep_rows(&mut tx, divergence, at).await?;
        write_checkpoint(&mut tx, &checkpoint).await?;
        for parent in &sweep.parents {
            recompute_one(&mut tx, *parent).await?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(
            divergence,
            rollback_to = checkpoint.last_indexed_block,
            invalidated = sweep.total(),
            "reorg recovery committed"
        );
        Ok(sweep)
    }

    async fn recompute_aggregate(&self, parent: ParentId) -> Result<(), IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        recompute_one(&mut tx, parent).await?;
        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn aggregate(&self, parent: ParentId) -> Result<Option<ParentAggregate>, IndexerError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        read_aggregate(&mut conn, parent).await
    }

    async fn live_events_for_parent(
        &self,
        parent: ParentId,
    ) -> Result<Vec<IndexedEvent>, IndexerError> {
        let (kind, id) = parent_parts(parent);
        let rows = sqlx::query(
            "SELECT tx_hash, log_index, block_number, block_hash, block_timestamp,
                    validity, reorged_at, payload_json
             FROM events
             WHERE validity = 0 AND parent_kind = ? AND parent_id = ?
             ORDER BY id",
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        rows.iter().map(row_to_event).collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agoraindex_core::events::{TradePlaced, VoteCast, VoteSupport};
    use agoraindex_core::types::RawLog;

    fn vote_event(block: u64, log_index: u32, weight: u128) -> IndexedEvent {
        let log = RawLog {
            address: "0xgov".into(),
            topics: vec![],
            data: "0x".into(),
            tx_hash: format!("0xtx-{block}-{log_index}"),
            log_index,
            block_number: block,
            block_hash: format!("0xb{block}"),
        };
        IndexedEvent {
            meta: EventMeta::from_log(&log, block * 2),
            event: DomainEvent::VoteCast(VoteCast {
                proposal_id: 1,
                voter: "0xv".into(),
                support: VoteSupport::For,
                weight,
            }),
        }
    }

    fn trade_event(block: u64, log_index: u32, amount: u128) -> IndexedEvent {
        let log = RawLog {
            address: "0xmkt".into(),
            topics: vec![],
            data: "0x".into(),
            tx_hash: format!("0xtx-mkt-{block}-{log_index}"),
            log_index,
            block_number: block,
            block_hash: format!("0xb{block}"),
        };
        IndexedEvent {
            meta: EventMeta::from_log(&log, block * 2),
            event: DomainEvent::TradePlaced(TradePlaced {
                market_id: 7,
                trader: "0xt".into(),
                outcome: 1,
                amount,
            }),
        }
    }

    fn proposal_tally(agg: ParentAggregate) -> agoraindex_core::aggregates::ProposalTally {
        match agg {
            ParentAggregate::Proposal(t) => t,
            other => panic!("expected proposal aggregate, got {other:?}"),
        }
    }

    // ── Checkpoint ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.checkpoint().await.unwrap().is_none());

        store
            .set_checkpoint(Checkpoint::new(1_000, "0xabc", Some(1_064)))
            .await
            .unwrap();

        let loaded = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(loaded.last_indexed_block, 1_000);
        assert_eq!(loaded.last_indexed_hash, "0xabc");
        assert_eq!(loaded.chain_head_block, Some(1_064));
    }

    #[tokio::test]
    async fn checkpoint_is_a_singleton_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .set_checkpoint(Checkpoint::new(100, "0xold", None))
            .await
            .unwrap();
        store
            .set_checkpoint(Checkpoint::new(200, "0xnew", Some(300)))
            .await
            .unwrap();

        let loaded = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(loaded.last_indexed_block, 200);
        assert_eq!(loaded.last_indexed_hash, "0xnew");
    }

    // ── Inserts & aggregates ──────────────────────────────────────────────────

    #[tokio::test]
    async fn duplicate_insert_is_a_noop() {
        let store = SqliteStore::in_memory().await.unwrap();
        let ev = vote_event(100, 0, 50);

        assert!(store.insert_event(&ev).await.unwrap());
        assert!(!store.insert_event(&ev).await.unwrap());

        let tally = proposal_tally(store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap());
        assert_eq!(tally.for_votes, 50, "aggregate applied exactly once");
    }

    #[tokio::test]
    async fn payload_roundtrips_through_json() {
        let store = SqliteStore::in_memory().await.unwrap();
        let ev = trade_event(100, 3, 400);
        store.insert_event(&ev).await.unwrap();

        let loaded = store
            .live_events_for_parent(ParentId::Market(7))
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], ev);
    }

    #[tokio::test]
    async fn commit_batch_advances_checkpoint_and_skips_duplicates() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = vec![vote_event(100, 0, 10), vote_event(100, 1, 20)];
        assert_eq!(
            store
                .commit_batch(&first, Checkpoint::new(100, "0xb100", Some(164)))
                .await
                .unwrap(),
            2
        );

        // Replay of a partially-applied range: same rows again plus one new.
        let replay = vec![vote_event(100, 1, 20), vote_event(101, 0, 5)];
        assert_eq!(
            store
                .commit_batch(&replay, Checkpoint::new(101, "0xb101", Some(165)))
                .await
                .unwrap(),
            1
        );

        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.last_indexed_block, 101);

        let tally = proposal_tally(store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap());
        assert_eq!(tally.for_votes, 35);
    }

    // ── Reorg sweep ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sweep_flips_rows_and_reports_parents() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (block, idx) in [(100, 0), (101, 0), (102, 0)] {
            store.insert_event(&vote_event(block, idx, 10)).await.unwrap();
        }
        store.insert_event(&trade_event(102, 1, 400)).await.unwrap();

        let sweep = store.mark_reorged_from(101, 1_700_000_000).await.unwrap();
        assert_eq!(sweep.total(), 3);
        assert!(sweep.parents.contains(&ParentId::Proposal(1)));
        assert!(sweep.parents.contains(&ParentId::Market(7)));

        // Live filters hide the swept rows.
        assert!(store.stored_block_hash(101).await.unwrap().is_none());
        assert_eq!(store.stored_block_hash(100).await.unwrap().unwrap(), "0xb100");
        assert_eq!(
            store
                .live_events_for_parent(ParentId::Proposal(1))
                .await
                .unwrap()
                .len(),
            1
        );

        // Counters are stale until recomputation runs.
        store.recompute_aggregate(ParentId::Proposal(1)).await.unwrap();
        let tally = proposal_tally(store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap());
        assert_eq!(tally.for_votes, 10);
    }

    #[tokio::test]
    async fn recovery_sweeps_rolls_back_and_recomputes_in_one_transaction() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (block, idx) in [(100, 0), (101, 0), (102, 0)] {
            store.insert_event(&vote_event(block, idx, 10)).await.unwrap();
        }
        store.insert_event(&trade_event(102, 1, 400)).await.unwrap();
        store
            .set_checkpoint(Checkpoint::new(102, "0xb102", Some(110)))
            .await
            .unwrap();

        let sweep = store
            .recover_reorg(101, 1_700_000_000, Checkpoint::new(100, "0xb100", Some(110)))
            .await
            .unwrap();
        assert_eq!(sweep.total(), 3);

        // All three effects landed together; no follow-up calls needed.
        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.last_indexed_block, 100);
        assert!(store.stored_block_hash(101).await.unwrap().is_none());

        let tally = proposal_tally(store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap());
        assert_eq!(tally.for_votes, 10);
        let ParentAggregate::Market(stats) =
            store.aggregate(ParentId::Market(7)).await.unwrap().unwrap()
        else {
            panic!("expected market aggregate")
        };
        assert_eq!(stats.trade_count, 0);
        assert_eq!(stats.total_volume, 0);
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing_live() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_event(&vote_event(100, 0, 10)).await.unwrap();
        store.mark_reorged_from(100, 111).await.unwrap();

        let again = store.mark_reorged_from(90, 222).await.unwrap();
        assert_eq!(again.total(), 0);
    }

    #[tokio::test]
    async fn reinserted_replacement_row_coexists_with_tombstone() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_event(&vote_event(100, 0, 10)).await.unwrap();
        store.mark_reorged_from(100, 111).await.unwrap();

        // Replacement history carries a different transaction.
        let mut replacement = vote_event(100, 0, 25);
        replacement.meta.tx_hash = "0xtx-fork".into();
        assert!(store.insert_event(&replacement).await.unwrap());

        let live = store
            .live_events_for_parent(ParentId::Proposal(1))
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].meta.tx_hash, "0xtx-fork");
    }

    #[tokio::test]
    async fn recompute_matches_live_children() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_event(&vote_event(100, 0, 10)).await.unwrap();
        store.insert_event(&vote_event(101, 0, 20)).await.unwrap();
        store.mark_reorged_from(101, 333).await.unwrap();
        store.recompute_aggregate(ParentId::Proposal(1)).await.unwrap();

        let parent = ParentId::Proposal(1);
        let live = store.live_events_for_parent(parent).await.unwrap();
        let expected = ParentAggregate::recompute(parent, live.iter().map(|e| &e.event));
        assert_eq!(store.aggregate(parent).await.unwrap().unwrap(), expected);
    }
}
