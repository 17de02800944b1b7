//! The persistence contract consumed by the indexing engine.
//!
//! The engine needs a narrow surface: checkpoint read/write, idempotent
//! insert keyed on `(tx_hash, log_index)`, an atomic batch commit, an
//! atomic reorg recovery, and aggregate recomputation. Backends: the
//! in-memory store below
//! (tests, ephemeral runs) and the SQLite store in `agoraindex-storage`.
//!
//! Every read helper applies the `Live` filter — reorged rows are invisible
//! to consumers by construction.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregates::ParentAggregate;
use crate::checkpoint::Checkpoint;
use crate::error::IndexerError;
use crate::events::{EventKind, ParentId};
use crate::types::{IndexedEvent, Validity};

// ─── Reorg sweep result ───────────────────────────────────────────────────────

/// Outcome of soft-invalidating all rows at or above a divergence height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgSweep {
    /// Rows flipped to `Reorged`, per event kind.
    pub by_kind: BTreeMap<EventKind, u64>,
    /// Parents whose aggregates are now stale and need recomputation.
    pub parents: BTreeSet<ParentId>,
}

impl ReorgSweep {
    /// Total rows invalidated.
    pub fn total(&self) -> u64 {
        self.by_kind.values().sum()
    }
}

// ─── Store trait ──────────────────────────────────────────────────────────────

/// Persistence backend for the projection.
#[async_trait]
pub trait Store: Send + Sync {
    /// The persisted checkpoint, if one exists.
    async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexerError>;

    /// Overwrite the singleton checkpoint row.
    async fn set_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Block hash recorded by any live event at `block`, or `None` if the
    /// height holds no live events (nothing to compare during reorg scans).
    async fn stored_block_hash(&self, block: u64) -> Result<Option<String>, IndexerError>;

    /// Insert one event; a no-op returning `false` if a row with the same
    /// `(tx_hash, log_index)` already exists. Parent aggregates are updated
    /// only when the insert actually took.
    async fn insert_event(&self, event: &IndexedEvent) -> Result<bool, IndexerError>;

    /// Atomically insert a batch and advance the checkpoint.
    ///
    /// This is the engine's only mutation boundary: either every insert,
    /// every aggregate update, and the checkpoint advance commit together,
    /// or none of them do. Returns the number of rows actually inserted
    /// (duplicates from a replayed range are no-ops).
    async fn commit_batch(
        &self,
        events: &[IndexedEvent],
        checkpoint: Checkpoint,
    ) -> Result<u64, IndexerError>;

    /// Flip `validity = Reorged, reorged_at = at` on every live row with
    /// `block_number >= block`, of every event kind.
    async fn mark_reorged_from(&self, block: u64, at: i64) -> Result<ReorgSweep, IndexerError>;

    /// Atomic reorg recovery: sweep every live row with `block_number >=
    /// divergence` (as `mark_reorged_from`), write the rolled-back
    /// checkpoint, and recompute the aggregates of every parent the sweep
    /// touched, all in one transaction.
    ///
    /// The sweep removes the very rows the detector compares against, so a
    /// half-committed recovery would be invisible to re-detection on
    /// restart. Either the whole recovery commits or none of it does.
    async fn recover_reorg(
        &self,
        divergence: u64,
        at: i64,
        checkpoint: Checkpoint,
    ) -> Result<ReorgSweep, IndexerError>;

    /// Rebuild a parent's counters from its live children.
    async fn recompute_aggregate(&self, parent: ParentId) -> Result<(), IndexerError>;

    /// Current aggregate for a parent, if the parent has any recorded state.
    async fn aggregate(&self, parent: ParentId) -> Result<Option<ParentAggregate>, IndexerError>;

    /// Live (non-reorged) child events of a parent, in insertion order.
    async fn live_events_for_parent(
        &self,
        parent: ParentId,
    ) -> Result<Vec<IndexedEvent>, IndexerError>;
}

// ─── In-memory store ──────────────────────────────────────────────────────────

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct MemoryInner {
    checkpoint: Option<Checkpoint>,
    events: Vec<IndexedEvent>,
    identities: HashSet<(String, u32)>,
    aggregates: HashMap<ParentId, ParentAggregate>,
}

impl MemoryInner {
    fn insert(&mut self, event: &IndexedEvent) -> bool {
        let key = event.meta.identity();
        if self.identities.contains(&key) {
            return false;
        }
        self.identities.insert(key);
        self.aggregates
            .entry(event.event.parent())
            .or_insert_with(|| ParentAggregate::empty_for(event.event.parent()))
            .apply(&event.event);
        self.events.push(event.clone());
        true
    }

    fn live_children(&self, parent: ParentId) -> Vec<IndexedEvent> {
        self.events
            .iter()
            .filter(|e| e.meta.validity.is_live() && e.event.parent() == parent)
            .cloned()
            .collect()
    }

    fn sweep_from(&mut self, block: u64, at: i64) -> ReorgSweep {
        let mut sweep = ReorgSweep::default();
        for event in self.events.iter_mut() {
            if event.meta.validity.is_live() && event.meta.block_number >= block {
                event.meta.validity = Validity::Reorged;
                event.meta.reorged_at = Some(at);
                *sweep.by_kind.entry(event.event.kind()).or_default() += 1;
                sweep.parents.insert(event.event.parent());
            }
        }
        sweep
    }
}

/// In-memory projection store.
///
/// A single mutex guards all state, so `commit_batch` is trivially atomic:
/// there is no observable intermediate state and in-memory inserts cannot
/// fail partway.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All live rows, in insertion order. Test/debug helper.
    pub fn live_events(&self) -> Vec<IndexedEvent> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.meta.validity.is_live())
            .cloned()
            .collect()
    }

    /// Total row count including reorged rows. Test/debug helper.
    pub fn row_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self.inner.lock().unwrap().checkpoint.clone())
    }

    async fn set_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        self.inner.lock().unwrap().checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn stored_block_hash(&self, block: u64) -> Result<Option<String>, IndexerError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|e| e.meta.validity.is_live() && e.meta.block_number == block)
            .map(|e| e.meta.block_hash.clone()))
    }

    async fn insert_event(&self, event: &IndexedEvent) -> Result<bool, IndexerError> {
        Ok(self.inner.lock().unwrap().insert(event))
    }

    async fn commit_batch(
        &self,
        events: &[IndexedEvent],
        checkpoint: Checkpoint,
    ) -> Result<u64, IndexerError> {
        let mut inner = self.inner.lock().unwrap();
        let mut inserted = 0;
        for event in events {
            if inner.insert(event) {
                inserted += 1;
            }
        }
        inner.checkpoint = Some(checkpoint);
        Ok(inserted)
    }

    async fn mark_reorged_from(&self, block: u64, at: i64) -> Result<ReorgSweep, IndexerError> {
        Ok(self.inner.lock().unwrap().sweep_from(block, at))
    }

    async fn recover_reorg(
        &self,
        divergence: u64,
        at: i64,
        checkpoint: Checkpoint,
    ) -> Result<ReorgSweep, IndexerError> {
        // One lock held across sweep, rollback, and recompute: no observable
        // intermediate state.
        let mut inner = self.inner.lock().unwrap();
        let sweep = inner.sweep_from(divergence, at);
        inner.checkpoint = Some(checkpoint);
        for parent in &sweep.parents {
            let children = inner.live_children(*parent);
            let rebuilt = ParentAggregate::recompute(*parent, children.iter().map(|e| &e.event));
            inner.aggregates.insert(*parent, rebuilt);
        }
        Ok(sweep)
    }

    async fn recompute_aggregate(&self, parent: ParentId) -> Result<(), IndexerError> {
        let mut inner = self.inner.lock().unwrap();
        let children = inner.live_children(parent);
        let rebuilt = ParentAggregate::recompute(parent, children.iter().map(|e| &e.event));
        inner.aggregates.insert(parent, rebuilt);
        Ok(())
    }

    async fn aggregate(&self, parent: ParentId) -> Result<Option<ParentAggregate>, IndexerError> {
        Ok(self.inner.lock().unwrap().aggregates.get(&parent).cloned())
    }

    async fn live_events_for_parent(
        &self,
        parent: ParentId,
    ) -> Result<Vec<IndexedEvent>, IndexerError> {
        Ok(self.inner.lock().unwrap().live_children(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DomainEvent, VoteCast, VoteSupport};
    use crate::types::{EventMeta, RawLog};

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

    #[tokio::test]
    async fn duplicate_insert_is_a_noop() {
        let store = MemoryStore::new();
        let ev = vote_event(100, 0, 50);

        assert!(store.insert_event(&ev).await.unwrap());
        assert!(!store.insert_event(&ev).await.unwrap());

        assert_eq!(store.row_count(), 1);
        let agg = store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap();
        let ParentAggregate::Proposal(t) = agg else { panic!() };
        assert_eq!(t.for_votes, 50, "aggregate applied exactly once");
    }

    #[tokio::test]
    async fn commit_batch_advances_checkpoint_and_skips_duplicates() {
        let store = MemoryStore::new();
        let first = vec![vote_event(100, 0, 10), vote_event(100, 1, 20)];
        let cp1 = Checkpoint::new(100, "0xb100", Some(164));
        assert_eq!(store.commit_batch(&first, cp1).await.unwrap(), 2);

        // Replay of a partially-applied range: same rows again plus one new.
        let replay = vec![vote_event(100, 1, 20), vote_event(101, 0, 5)];
        let cp2 = Checkpoint::new(101, "0xb101", Some(165));
        assert_eq!(store.commit_batch(&replay, cp2).await.unwrap(), 1);

        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.last_indexed_block, 101);

        let agg = store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap();
        let ParentAggregate::Proposal(t) = agg else { panic!() };
        assert_eq!(t.for_votes, 35);
    }

    #[tokio::test]
    async fn mark_reorged_flips_rows_and_reports_parents() {
        let store = MemoryStore::new();
        for (block, idx) in [(100, 0), (101, 0), (102, 0)] {
            store.insert_event(&vote_event(block, idx, 10)).await.unwrap();
        }

        let sweep = store.mark_reorged_from(101, 1_700_000_000).await.unwrap();
        assert_eq!(sweep.total(), 2);
        assert_eq!(sweep.by_kind[&EventKind::VoteCast], 2);
        assert!(sweep.parents.contains(&ParentId::Proposal(1)));

        // Live filter hides the swept rows.
        assert_eq!(store.live_events().len(), 1);
        assert!(store.stored_block_hash(101).await.unwrap().is_none());
        assert_eq!(store.stored_block_hash(100).await.unwrap().unwrap(), "0xb100");

        // Counters are stale until recomputation is invoked explicitly.
        store.recompute_aggregate(ParentId::Proposal(1)).await.unwrap();
        let agg = store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap();
        let ParentAggregate::Proposal(t) = agg else { panic!() };
        assert_eq!(t.for_votes, 10);
    }

    #[tokio::test]
    async fn recovery_sweeps_rolls_back_and_recomputes_in_one_step() {
        let store = MemoryStore::new();
        for (block, idx) in [(100, 0), (101, 0), (102, 0)] {
            store.insert_event(&vote_event(block, idx, 10)).await.unwrap();
        }
        store
            .set_checkpoint(Checkpoint::new(102, "0xb102", Some(110)))
            .await
            .unwrap();

        let sweep = store
            .recover_reorg(101, 1_700_000_000, Checkpoint::new(100, "0xb100", Some(110)))
            .await
            .unwrap();

        assert_eq!(sweep.total(), 2);
        assert_eq!(store.live_events().len(), 1);

        // Checkpoint and aggregates are already correct; no follow-up calls.
        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.last_indexed_block, 100);
        let agg = store.aggregate(ParentId::Proposal(1)).await.unwrap().unwrap();
        let ParentAggregate::Proposal(t) = agg else { panic!() };
        assert_eq!(t.for_votes, 10);
    }

    #[tokio::test]
    async fn sweep_is_set_once_and_never_cleared() {
        let store = MemoryStore::new();
        store.insert_event(&vote_event(100, 0, 10)).await.unwrap();
        store.mark_reorged_from(100, 111).await.unwrap();

        // A second sweep over the same range finds nothing live to flip.
        let again = store.mark_reorged_from(90, 222).await.unwrap();
        assert_eq!(again.total(), 0);
    }
}
