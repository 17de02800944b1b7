//! The indexing loop — orchestrates gating, reorg recovery, fetching,
//! decoding, and atomic batch commits on a fixed poll cadence.
//!
//! Per iteration while running:
//! 1. Read head `H`; compute `safe = H - confirmation_depth`. Nothing to do
//!    if the checkpoint already covers `safe`.
//! 2. Run the reorg scan; on divergence, recover and restart the iteration.
//! 3. Fetch + merge logs for the next `[from, to]` window (`to <= safe`).
//! 4. Decode in order; hand the typed events to one atomic `commit_batch`
//!    that also advances the checkpoint.
//!
//! Errors never kill the loop: they are recorded as `last_error` and retried
//! under capped exponential backoff. Inserts are idempotent on
//! `(tx_hash, log_index)`, so replaying a partially-applied range after a
//! crash is safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::checkpoint::Checkpoint;
use crate::client::ChainClient;
use crate::config::IndexerConfig;
use crate::decode::decode_log;
use crate::error::IndexerError;
use crate::fetch::fetch_batch;
use crate::reorg::{handle_reorg, ReorgDetector};
use crate::store::Store;
use crate::types::{EventMeta, IndexedEvent};

const BASE_BACKOFF_MS: u64 = 500;

// ─── Loop state & status ──────────────────────────────────────────────────────

/// Cooperative loop state, checked once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Running,
    Paused,
    Stopped,
}

impl LoopState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Paused => 1,
            Self::Stopped => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot exposed to the query/API collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerStatus {
    pub is_running: bool,
    pub state: LoopState,
    pub last_indexed_block: u64,
    pub chain_head: u64,
    pub processed_events: u64,
    pub reorgs_handled: u64,
    pub last_error: Option<String>,
}

/// State shared between the loop task and its control handle.
struct Shared {
    state: AtomicU8,
    is_running: AtomicBool,
    last_indexed: AtomicU64,
    chain_head: AtomicU64,
    processed_events: AtomicU64,
    reorgs_handled: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Running.as_u8()),
            is_running: AtomicBool::new(false),
            last_indexed: AtomicU64::new(0),
            chain_head: AtomicU64::new(0),
            processed_events: AtomicU64::new(0),
            reorgs_handled: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    fn loop_state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_loop_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn record_error(&self, error: &IndexerError) {
        *self.last_error.lock().unwrap() = Some(error.to_string());
    }

    fn status(&self) -> IndexerStatus {
        IndexerStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            state: self.loop_state(),
            last_indexed_block: self.last_indexed.load(Ordering::SeqCst),
            chain_head: self.chain_head.load(Ordering::SeqCst),
            processed_events: self.processed_events.load(Ordering::SeqCst),
            reorgs_handled: self.reorgs_handled.load(Ordering::SeqCst),
            last_error: self.last_error.lock().unwrap().clone(),
        }
    }
}

// ─── Iteration outcome ────────────────────────────────────────────────────────

/// What a single loop pass accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing new is finalized enough to process.
    CaughtUp,
    /// A batch committed and the checkpoint advanced.
    Indexed { from: u64, to: u64, inserted: u64 },
    /// A divergence was recovered; the iteration restarts from detection.
    ReorgHandled { at: u64, invalidated: u64 },
}

// ─── Indexer ──────────────────────────────────────────────────────────────────

/// The indexing engine: one owned value holding everything the loop needs.
/// No ambient globals — construct, `start()`, and the returned handle
/// controls the lifecycle.
pub struct Indexer {
    config: IndexerConfig,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    detector: ReorgDetector,
    shared: Arc<Shared>,
}

impl Indexer {
    /// Build an engine. Configuration problems are fatal and reported here.
    pub fn new(
        config: IndexerConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let detector = ReorgDetector::new(config.reorg_check_depth);
        Ok(Self {
            config,
            client,
            store,
            detector,
            shared: Arc::new(Shared::new()),
        })
    }

    /// Probe the chain and spawn the loop task.
    ///
    /// An unreachable chain at boot propagates out of here and aborts
    /// startup; once the loop is running, chain errors only back off.
    pub async fn start(self) -> Result<IndexerHandle, IndexerError> {
        let head = self.client.head_block_number().await?;
        self.shared.chain_head.store(head, Ordering::SeqCst);

        if let Some(cp) = self.store.checkpoint().await? {
            tracing::info!(
                block = cp.last_indexed_block,
                hash = %cp.last_indexed_hash,
                "resuming from checkpoint"
            );
            self.shared
                .last_indexed
                .store(cp.last_indexed_block, Ordering::SeqCst);
        } else {
            tracing::info!(start_block = self.config.start_block, "fresh start");
        }

        let shared = self.shared.clone();
        shared.set_loop_state(LoopState::Running);
        shared.is_running.store(true, Ordering::SeqCst);

        let join = tokio::spawn(self.run_loop());
        Ok(IndexerHandle { shared, join })
    }

    async fn run_loop(self) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let mut backoff_ms = BASE_BACKOFF_MS;

        loop {
            match self.shared.loop_state() {
                LoopState::Stopped => break,
                LoopState::Paused => {
                    sleep(poll).await;
                    continue;
                }
                LoopState::Running => {}
            }

            match self.run_iteration().await {
                Ok(IterationOutcome::CaughtUp) => {
                    backoff_ms = BASE_BACKOFF_MS;
                    sleep(poll).await;
                }
                Ok(IterationOutcome::Indexed { from, to, inserted }) => {
                    backoff_ms = BASE_BACKOFF_MS;
                    tracing::info!(from, to, inserted, "batch committed");
                }
                Ok(IterationOutcome::ReorgHandled { at, invalidated }) => {
                    backoff_ms = BASE_BACKOFF_MS;
                    tracing::warn!(at, invalidated, "reorg recovered, re-scanning");
                }
                Err(error) => {
                    tracing::warn!(%error, backoff_ms, "iteration failed, backing off");
                    self.shared.record_error(&error);
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(self.config.max_backoff_ms);
                }
            }
        }

        self.shared.is_running.store(false, Ordering::SeqCst);
        tracing::info!("indexing loop stopped");
    }

    /// One pass of the loop. Public within the crate so tests can drive the
    /// engine deterministically without timers.
    pub(crate) async fn run_iteration(&self) -> Result<IterationOutcome, IndexerError> {
        let head = self.client.head_block_number().await?;
        self.shared.chain_head.store(head, Ordering::SeqCst);
        let safe = head.saturating_sub(self.config.confirmation_depth);

        let checkpoint = self.store.checkpoint().await?;

        // Divergence check runs before any other work — including the
        // caught-up return, so a quiet chain still gets scanned. Recovery
        // ends the iteration; re-detection happens on the rolled-back
        // checkpoint next pass.
        if let Some(cp) = &checkpoint {
            if let Some(divergence) = self
                .detector
                .scan(self.client.as_ref(), self.store.as_ref(), cp.last_indexed_block)
                .await?
            {
                let sweep =
                    handle_reorg(self.client.as_ref(), self.store.as_ref(), divergence, head)
                        .await?;
                self.shared.reorgs_handled.fetch_add(1, Ordering::SeqCst);
                self.shared
                    .last_indexed
                    .store(divergence.saturating_sub(1), Ordering::SeqCst);
                return Ok(IterationOutcome::ReorgHandled {
                    at: divergence,
                    invalidated: sweep.total(),
                });
            }
        }

        let from = match &checkpoint {
            Some(cp) => cp.next_block(),
            None => self.config.start_block,
        };
        if from > safe {
            return Ok(IterationOutcome::CaughtUp);
        }

        let to = (from + self.config.batch_size - 1).min(safe);
        let merged = fetch_batch(self.client.as_ref(), &self.config.contracts, from, to).await?;

        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut events = Vec::new();
        for (contract, log) in &merged {
            match decode_log(*contract, log) {
                Some(event) => {
                    let block_timestamp = match timestamps.get(&log.block_number) {
                        Some(ts) => *ts,
                        None => {
                            let ts = self
                                .client
                                .block_by_number(log.block_number)
                                .await?
                                .map(|h| h.timestamp)
                                .unwrap_or_default();
                            timestamps.insert(log.block_number, ts);
                            ts
                        }
                    };
                    events.push(IndexedEvent {
                        meta: EventMeta::from_log(log, block_timestamp),
                        event,
                    });
                }
                None => {
                    tracing::debug!(
                        contract = %contract,
                        topic0 = log.topic0().unwrap_or("<none>"),
                        block = log.block_number,
                        "unrecognized log skipped"
                    );
                }
            }
        }

        let to_hash = self
            .client
            .block_by_number(to)
            .await?
            .map(|h| h.hash)
            .ok_or_else(|| IndexerError::Rpc(format!("missing header for block {to}")))?;

        let inserted = self
            .store
            .commit_batch(&events, Checkpoint::new(to, to_hash, Some(head)))
            .await?;

        self.shared
            .processed_events
            .fetch_add(inserted, Ordering::SeqCst);
        self.shared.last_indexed.store(to, Ordering::SeqCst);

        Ok(IterationOutcome::Indexed { from, to, inserted })
    }

    /// Status snapshot; also available on the handle after `start()`.
    pub fn status(&self) -> IndexerStatus {
        self.shared.status()
    }
}

// ─── Control handle ───────────────────────────────────────────────────────────

/// Control surface handed to the embedding process after `start()`.
pub struct IndexerHandle {
    shared: Arc<Shared>,
    join: JoinHandle<()>,
}

impl IndexerHandle {
    pub fn status(&self) -> IndexerStatus {
        self.shared.status()
    }

    /// Suspend indexing after the current iteration finishes.
    pub fn pause(&self) {
        if self.shared.loop_state() == LoopState::Running {
            self.shared.set_loop_state(LoopState::Paused);
            tracing::info!("indexer paused");
        }
    }

    /// Resume a paused loop.
    pub fn resume(&self) {
        if self.shared.loop_state() == LoopState::Paused {
            self.shared.set_loop_state(LoopState::Running);
            tracing::info!("indexer resumed");
        }
    }

    /// Request a stop and wait up to `grace` for the current iteration to
    /// finish. In-flight batch transactions are never cancelled; if the
    /// grace period elapses the task is aborted and an error returned.
    pub async fn stop(mut self, grace: Duration) -> Result<(), IndexerError> {
        self.shared.set_loop_state(LoopState::Stopped);
        match timeout(grace, &mut self.join).await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.join.abort();
                Err(IndexerError::Aborted {
                    reason: format!("loop did not stop within {grace:?}"),
                })
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
