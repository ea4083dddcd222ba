use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chain::{
    Block, BlockIdFlag, CheckpointStatus, Commit, CommitSig, EventKind, TransactionEvent,
};
use chrono::{TimeZone, Utc};
use node_rpc::{NodeRpcError, RawCheckpointWithMeta, StakingValidator, MSG_INJECTED_CHECKPOINT};
use serde_json::{json, Value};
use store::{HeightCache, MemoryHeightCache, MemoryStore, SignatureFilter};
use sync::{
    BackfillConfig, BlockHeightTracker, BlockPipeline, ChainSource, CheckpointConfig,
    CheckpointLifecycleEngine, EventDispatchRegistry, MemoryValidatorRegistry,
    MissedRangeProcessor, NewBlockProcessor, PruningBoundaries, RetryPolicy, SyncError,
    TrackerConfig, ValidatorInfo, ValidatorSignatureTracker,
};

const NET: &str = "bbn-test";
const VAL_A: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const VAL_B: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";
const VAL_A_B64: &str = "qqqqqqqqqqqqqqqqqqqqqqqqqqo=";
const VAL_B_B64: &str = "u7u7u7u7u7u7u7u7u7u7u7u7u7s=";

// ---------------------------------------------------------------------------
// Mock chain
// ---------------------------------------------------------------------------

/// Serves generated blocks for `[lowest, current]`. Every block's commit is
/// signed by A; B is absent.
struct MockChain {
    lowest: u64,
    current: AtomicU64,
    fetched: Mutex<Vec<u64>>,
    messages: Mutex<HashMap<u64, Vec<Value>>>,
    /// Heights that answer "not yet available" once.
    lagging_once: Mutex<HashSet<u64>>,
    /// Heights that always fail with a transient error.
    failing: Mutex<HashSet<u64>>,
    /// Heights whose block loads but whose messages always fail.
    failing_messages: Mutex<HashSet<u64>>,
    rotations: AtomicU32,
}

impl MockChain {
    fn new(lowest: u64, current: u64) -> Self {
        Self {
            lowest,
            current: AtomicU64::new(current),
            fetched: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            lagging_once: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            failing_messages: Mutex::new(HashSet::new()),
            rotations: AtomicU32::new(0),
        }
    }

    fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    fn set_messages(&self, height: u64, msgs: Vec<Value>) {
        self.messages.lock().unwrap().insert(height, msgs);
    }

    fn check_available(&self, height: u64) -> Result<(), NodeRpcError> {
        let current = self.current.load(Ordering::SeqCst);
        if height < self.lowest {
            return Err(NodeRpcError::HeightPruned {
                height,
                lowest_available: Some(self.lowest),
            });
        }
        if height > current || self.lagging_once.lock().unwrap().remove(&height) {
            return Err(NodeRpcError::HeightNotYetAvailable {
                height,
                current: Some(current),
            });
        }
        if self.failing.lock().unwrap().contains(&height) {
            return Err(NodeRpcError::NullResult);
        }
        Ok(())
    }
}

fn block(height: u64) -> Block {
    let sig = |addr: &str, flag| CommitSig {
        validator_address: addr.to_string(),
        flag,
        timestamp: None,
        signature: None,
    };
    Block {
        height,
        hash: format!("{height:064X}"),
        chain_id: NET.to_string(),
        time: Utc.timestamp_opt(1_700_000_000 + height as i64, 0).unwrap(),
        txs: Vec::new(),
        last_commit: Some(Commit {
            height: height - 1,
            round: 0,
            signatures: vec![
                sig(VAL_A, BlockIdFlag::Commit),
                sig(VAL_B, BlockIdFlag::Absent),
            ],
        }),
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn get_current_height(&self, _network: &str) -> Result<u64, NodeRpcError> {
        Ok(self.current.load(Ordering::SeqCst))
    }

    async fn get_block_by_height(
        &self,
        _network: &str,
        height: u64,
    ) -> Result<Block, NodeRpcError> {
        self.fetched.lock().unwrap().push(height);
        self.check_available(height)?;
        Ok(block(height))
    }

    async fn get_block_by_hash(&self, _network: &str, hash: &str) -> Result<Block, NodeRpcError> {
        Err(NodeRpcError::Malformed(format!("unknown hash {hash}")))
    }

    async fn get_block_messages(
        &self,
        _network: &str,
        height: u64,
    ) -> Result<Vec<Value>, NodeRpcError> {
        self.check_available(height)?;
        if self.failing_messages.lock().unwrap().contains(&height) {
            return Err(NodeRpcError::NullResult);
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_raw_checkpoint(
        &self,
        _network: &str,
        epoch: u64,
    ) -> Result<RawCheckpointWithMeta, NodeRpcError> {
        Err(NodeRpcError::Malformed(format!("no raw checkpoint {epoch}")))
    }

    async fn get_validators(&self, _network: &str) -> Result<Vec<StakingValidator>, NodeRpcError> {
        Ok(Vec::new())
    }

    fn rotate_endpoint(&self, _network: &str) {
        self.rotations.fetch_add(1, Ordering::SeqCst);
    }
}

fn injected_checkpoint(epoch: u64, status: &str) -> Value {
    json!({
        "@type": MSG_INJECTED_CHECKPOINT,
        "ckpt": {
            "ckpt": {
                "epoch_num": epoch.to_string(),
                "block_hash": "AQID",
                "bitmap": "wA==",
                "bls_multi_sig": "AAAA"
            },
            "status": status,
            "bls_aggr_pk": "",
            "power_sum": "60",
            "lifecycle": []
        },
        "extended_commit_info": {
            "round": 0,
            "votes": [
                {
                    "validator": { "address": VAL_A_B64, "power": "60" },
                    "vote_extension": "AQ==",
                    "extension_signature": "Ag==",
                    "block_id_flag": "BLOCK_ID_FLAG_COMMIT"
                },
                {
                    "validator": { "address": VAL_B_B64, "power": "40" },
                    "block_id_flag": "BLOCK_ID_FLAG_ABSENT"
                }
            ]
        }
    })
}

fn validators() -> Vec<ValidatorInfo> {
    vec![
        ValidatorInfo {
            moniker: "alpha".into(),
            valoper_address: "bbnvaloper1alpha".into(),
            consensus_address: VAL_A.into(),
        },
        ValidatorInfo {
            moniker: "beta".into(),
            valoper_address: "bbnvaloper1beta".into(),
            consensus_address: VAL_B.into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    chain: Arc<MockChain>,
    store: Arc<MemoryStore>,
    cache: Arc<MemoryHeightCache>,
    registry: Arc<MemoryValidatorRegistry>,
    boundaries: Arc<PruningBoundaries>,
    engine: Arc<CheckpointLifecycleEngine>,
    backfill: Arc<MissedRangeProcessor>,
    tracker: Arc<BlockHeightTracker>,
}

fn harness_with(chain: MockChain, registry_wait: Duration) -> Harness {
    let chain = Arc::new(chain);
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryHeightCache::new());
    let registry = Arc::new(MemoryValidatorRegistry::new());
    let boundaries = Arc::new(PruningBoundaries::new());

    let engine = Arc::new(CheckpointLifecycleEngine::new(
        chain.clone(),
        store.clone(),
        registry.clone(),
        boundaries.clone(),
        CheckpointConfig {
            retry: RetryPolicy::immediate(3),
            registry_wait,
        },
    ));
    let pipeline = Arc::new(BlockPipeline::new(
        Arc::new(ValidatorSignatureTracker::new(store.clone())),
        engine.clone(),
        true,
    ));
    let backfill = Arc::new(MissedRangeProcessor::new(
        chain.clone(),
        pipeline,
        boundaries.clone(),
        BackfillConfig {
            inter_batch_delay: Duration::ZERO,
            retry: RetryPolicy::immediate(3),
            ..BackfillConfig::default()
        },
    ));
    let tracker = Arc::new(BlockHeightTracker::new(
        backfill.clone(),
        cache.clone(),
        TrackerConfig::default(),
    ));

    Harness {
        chain,
        store,
        cache,
        registry,
        boundaries,
        engine,
        backfill,
        tracker,
    }
}

fn harness(chain: MockChain) -> Harness {
    harness_with(chain, Duration::from_secs(5))
}

fn window_heights(h: &Harness, addr: &str) -> Vec<u64> {
    h.store
        .signature_record(NET, addr)
        .unwrap()
        .map(|r| r.recent_blocks.iter().map(|e| e.block_height).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Height tracking and backfill
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gap_is_backfilled_before_advance() {
    let h = harness(MockChain::new(1, 200));
    h.cache
        .set(NET, 100, Duration::from_secs(60))
        .await
        .unwrap();

    h.tracker.observe_block(NET, &block(103)).await.unwrap();

    assert_eq!(h.chain.fetched(), vec![101, 102]);
    assert_eq!(h.tracker.last_processed_height(NET), Some(103));
    assert_eq!(h.cache.get(NET).await.unwrap(), Some(103));
    // Commits of 101, 102 and the live 103 attest heights 100..=102.
    assert_eq!(window_heights(&h, VAL_A), vec![100, 101, 102]);
    assert_eq!(window_heights(&h, VAL_B), vec![100, 101, 102]);
}

#[tokio::test]
async fn test_height_never_moves_backwards() {
    let h = harness(MockChain::new(1, 200));

    h.tracker.update_height(NET, 50).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(50));

    h.tracker.update_height(NET, 40).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(50));

    h.tracker.update_height(NET, 51).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(51));
    assert!(h.chain.fetched().is_empty());
}

#[tokio::test]
async fn test_backfill_truncates_at_pruning_boundary() {
    let h = harness(MockChain::new(920, 1000));

    let outcome = h.backfill.process_range(NET, 900, 950).await.unwrap();

    assert_eq!(outcome.pruned_below, Some(920));
    assert_eq!(outcome.processed, 31);
    assert_eq!(outcome.stopped_at, None);
    assert_eq!(h.boundaries.lowest(NET), Some(920));
    let fetched = h.chain.fetched();
    assert_eq!(fetched[0], 900);
    assert_eq!(fetched[1], 920);
    assert_eq!(fetched.len(), 32);

    // A second scan starts at the boundary without probing below it.
    let again = h.backfill.process_range(NET, 900, 925).await.unwrap();
    assert_eq!(again.processed, 6);
    assert_eq!(h.chain.fetched()[32], 920);
}

#[tokio::test]
async fn test_consecutive_failures_abort_range() {
    let chain = MockChain::new(1, 100);
    chain.failing.lock().unwrap().extend(10..=14);
    let h = harness(chain);

    let err = h.backfill.process_range(NET, 1, 20).await.unwrap_err();
    assert!(matches!(err, SyncError::TooManyFailures { failures: 5, .. }));
}

#[tokio::test]
async fn test_isolated_failures_do_not_abort_range() {
    let chain = MockChain::new(1, 100);
    chain.failing.lock().unwrap().extend([5, 7, 9]);
    let h = harness(chain);

    let outcome = h.backfill.process_range(NET, 1, 10).await.unwrap();
    assert_eq!(outcome.processed, 7);
    assert_eq!(outcome.failed, 3);
    assert_eq!(outcome.first_failed, Some(5));
    assert_eq!(outcome.completed_through(), 4);
}

#[tokio::test]
async fn test_failed_gap_height_is_retried_by_next_block() {
    let chain = MockChain::new(1, 200);
    chain.failing.lock().unwrap().insert(101);
    let h = harness(chain);
    h.cache
        .set(NET, 100, Duration::from_secs(60))
        .await
        .unwrap();

    h.tracker.observe_block(NET, &block(103)).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(100));
    assert_eq!(h.cache.get(NET).await.unwrap(), Some(100));
    assert_eq!(window_heights(&h, VAL_A), vec![101, 102]);

    // The node recovers; the next block replays the hole first.
    h.chain.failing.lock().unwrap().clear();
    h.tracker.observe_block(NET, &block(104)).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(104));
    assert_eq!(&h.chain.fetched()[3..], &[101, 102, 103]);
    assert_eq!(window_heights(&h, VAL_A), vec![100, 101, 102, 103]);
}

#[tokio::test]
async fn test_failed_live_block_is_not_skipped() {
    let chain = MockChain::new(1, 2_000);
    chain.failing_messages.lock().unwrap().insert(1801);
    let h = harness(chain);
    h.registry.refresh(NET, validators());
    h.chain
        .set_messages(1801, vec![injected_checkpoint(5, "CKPT_STATUS_SEALED")]);
    h.cache
        .set(NET, 1800, Duration::from_secs(60))
        .await
        .unwrap();

    h.tracker.observe_block(NET, &block(1801)).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(1800));
    assert!(h.engine.get_checkpoint_by_epoch(NET, 5).await.unwrap().is_none());

    h.chain.failing_messages.lock().unwrap().clear();
    h.tracker.observe_block(NET, &block(1802)).await.unwrap();
    assert_eq!(h.tracker.last_processed_height(NET), Some(1802));
    assert_eq!(h.chain.fetched(), vec![1801]);
    let record = h.engine.get_checkpoint_by_epoch(NET, 5).await.unwrap();
    assert_eq!(record.unwrap().status, CheckpointStatus::Sealed);
}

#[tokio::test]
async fn test_pruned_checkpoint_does_not_hold_block() {
    let h = harness(MockChain::new(1, 2_000));
    // A boundary above the block: its checkpoint can never be fetched.
    h.boundaries.record(NET, 1_900);

    assert!(h.backfill.pipeline().process_block(NET, &block(1801)).await);
    assert_eq!(window_heights(&h, VAL_A), vec![1800]);
}

#[tokio::test]
async fn test_backfill_stops_at_node_tip() {
    let h = harness(MockChain::new(1, 105));

    let outcome = h.backfill.process_range(NET, 100, 110).await.unwrap();
    assert_eq!(outcome.processed, 6);
    assert_eq!(outcome.stopped_at, Some(106));
    assert_eq!(outcome.completed_through(), 105);
}

#[tokio::test]
async fn test_handle_reconnection_catches_up() {
    let h = harness(MockChain::new(1, 110));
    h.cache
        .set(NET, 100, Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = h.tracker.handle_reconnection(NET).await.unwrap().unwrap();
    assert_eq!((outcome.from, outcome.to), (101, 110));
    assert_eq!(outcome.processed, 10);
    assert_eq!(h.tracker.last_processed_height(NET), Some(110));

    assert!(h.tracker.handle_reconnection(NET).await.unwrap().is_none());
}

#[tokio::test]
async fn test_handle_reconnection_without_history_is_bounded() {
    let h = harness(MockChain::new(1, 5_000));

    let outcome = h.tracker.handle_reconnection(NET).await.unwrap().unwrap();
    assert_eq!((outcome.from, outcome.to), (4_001, 5_000));
    assert_eq!(h.tracker.last_processed_height(NET), Some(5_000));
}

#[tokio::test]
async fn test_historical_sync_defaults_to_recent_blocks() {
    let h = harness(MockChain::new(1, 300));

    let outcome = h
        .backfill
        .start_historical_sync(NET, Some(250), Some(100))
        .await
        .unwrap();
    assert_eq!((outcome.from, outcome.to), (250, 300));
    assert_eq!(outcome.processed, 51);

    let outcome = h
        .backfill
        .start_historical_sync(NET, None, Some(10))
        .await
        .unwrap();
    assert_eq!((outcome.from, outcome.to), (291, 300));
}

#[tokio::test]
async fn test_new_block_event_flows_through_dispatch() {
    let h = harness(MockChain::new(1, 200));
    let mut registry = EventDispatchRegistry::new();
    registry.register(Arc::new(NewBlockProcessor::new(h.tracker.clone())));

    let b = Arc::new(block(60));
    let event = TransactionEvent {
        network: NET.into(),
        subscription_id: "new-block".into(),
        kind: EventKind::NewBlock,
        height: 60,
        hash: Some(b.hash.clone()),
        events: Vec::new(),
        signer_address: None,
        timestamp: Some(b.time),
        block: Some(b),
    };

    assert_eq!(registry.dispatch(&event).await, 1);
    assert_eq!(h.tracker.last_processed_height(NET), Some(60));
    assert_eq!(window_heights(&h, VAL_A), vec![59]);
}

#[tokio::test]
async fn test_signature_queries() {
    let h = harness(MockChain::new(1, 200));
    let pipeline = h.backfill.pipeline();
    for height in 102..=105 {
        assert!(pipeline.process_block(NET, &block(height)).await);
    }
    let signatures = pipeline.signatures();

    let mut records = signatures
        .get_validator_signatures(&SignatureFilter::network(NET))
        .await
        .unwrap();
    records.sort_by(|a, b| a.validator_address.cmp(&b.validator_address));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].validator_address, VAL_A);
    assert_eq!(records[0].signature_rate, 100.0);
    assert_eq!(records[0].consecutive_signed, 4);
    assert_eq!(records[0].last_signed_block, Some(104));
    assert_eq!(records[1].signature_rate, 0.0);
    assert_eq!(records[1].consecutive_missed, 4);

    let low_rate = SignatureFilter {
        max_signature_rate: Some(50.0),
        ..SignatureFilter::network(NET)
    };
    let records = signatures.get_validator_signatures(&low_rate).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].validator_address, VAL_B);

    let missed = signatures
        .get_validator_missed_blocks(NET, VAL_B, 102, 103)
        .await
        .unwrap();
    let heights: Vec<u64> = missed.iter().map(|e| e.block_height).collect();
    assert_eq!(heights, vec![102, 103]);

    assert!(signatures
        .get_validator_missed_blocks(NET, VAL_A, 0, 200)
        .await
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_checkpoint_status_advances_once() {
    let h = harness(MockChain::new(1, 2_000));
    h.registry.refresh(NET, validators());
    h.chain
        .set_messages(1801, vec![injected_checkpoint(5, "CKPT_STATUS_SEALED")]);

    h.engine
        .apply_status_event(NET, 5, CheckpointStatus::Accumulating, 1790, None, None)
        .await
        .unwrap();

    let record = h
        .engine
        .fetch_checkpoint_for_epoch(NET, 5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, CheckpointStatus::Sealed);
    assert_eq!(record.lifecycle.len(), 2);
    assert_eq!(record.lifecycle[1].state, CheckpointStatus::Sealed);
    assert_eq!(record.lifecycle[1].block_height, 1801);
    assert_eq!(record.payload.block_hash, vec![1, 2, 3]);

    let stats = record.participation.clone().unwrap();
    assert_eq!(stats.total_power, 100);
    assert_eq!(stats.signed_power, 60);
    assert_eq!(stats.signed_power + stats.unsigned_power, stats.total_power);
    assert_eq!(stats.by_power, "60.00%");
    assert_eq!(stats.by_count, "50.00%");
    assert_eq!(record.votes[0].moniker, "alpha");
    assert_eq!(record.votes[0].vote_extension, Some(vec![1]));
    assert_eq!(record.votes[1].vote_extension, None);

    let again = h
        .engine
        .fetch_checkpoint_for_epoch(NET, 5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.lifecycle.len(), 2);
    assert_eq!(again.status, CheckpointStatus::Sealed);
}

#[tokio::test]
async fn test_stale_status_event_is_ignored() {
    let h = harness(MockChain::new(1, 2_000));

    h.engine
        .apply_status_event(NET, 3, CheckpointStatus::Confirmed, 1200, None, None)
        .await
        .unwrap();
    let (record, _) = h
        .engine
        .apply_status_event(NET, 3, CheckpointStatus::Sealed, 1100, None, None)
        .await
        .unwrap();
    assert_eq!(record.status, CheckpointStatus::Confirmed);
    assert_eq!(record.lifecycle.len(), 1);
}

#[tokio::test]
async fn test_replaying_a_block_is_idempotent() {
    let h = harness(MockChain::new(1, 2_000));
    h.registry.refresh(NET, validators());
    h.chain
        .set_messages(1801, vec![injected_checkpoint(5, "CKPT_STATUS_SEALED")]);
    let pipeline = h.backfill.pipeline();

    assert!(pipeline.process_block(NET, &block(1801)).await);
    let sigs_once = h.store.signature_record(NET, VAL_A).unwrap();
    let ckpt_once = h.engine.get_checkpoint_by_epoch(NET, 5).await.unwrap();
    assert!(ckpt_once.is_some());

    assert!(pipeline.process_block(NET, &block(1801)).await);
    assert_eq!(h.store.signature_record(NET, VAL_A).unwrap(), sigs_once);
    assert_eq!(h.engine.get_checkpoint_by_epoch(NET, 5).await.unwrap(), ckpt_once);
}

#[tokio::test]
async fn test_unknown_validator_waits_for_refresh() {
    let h = harness(MockChain::new(1, 2_000));
    h.chain
        .set_messages(1801, vec![injected_checkpoint(5, "CKPT_STATUS_SEALED")]);

    let registry = h.registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.refresh(NET, validators());
    });

    let record = h
        .engine
        .fetch_checkpoint_for_epoch(NET, 5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.votes.len(), 2);
    assert_eq!(record.votes[1].moniker, "beta");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_validator_fails_after_one_wait() {
    let h = harness_with(MockChain::new(1, 2_000), Duration::from_secs(90));
    h.chain
        .set_messages(1801, vec![injected_checkpoint(5, "CKPT_STATUS_SEALED")]);

    let err = h.engine.fetch_checkpoint_for_epoch(NET, 5).await.unwrap_err();
    assert!(matches!(err, SyncError::UnknownValidator { .. }));
    assert!(h.engine.get_checkpoint_by_epoch(NET, 5).await.unwrap().is_none());
}

#[tokio::test]
async fn test_not_yet_available_rotates_endpoint() {
    let chain = MockChain::new(1, 2_000);
    chain.lagging_once.lock().unwrap().insert(1801);
    let h = harness(chain);
    h.registry.refresh(NET, validators());
    h.chain
        .set_messages(1801, vec![injected_checkpoint(5, "CKPT_STATUS_SEALED")]);

    let record = h.engine.fetch_checkpoint_for_epoch(NET, 5).await.unwrap();
    assert!(record.is_some());
    assert_eq!(h.chain.rotations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pruned_epoch_is_not_retried() {
    let h = harness(MockChain::new(1_500, 2_000));

    let err = h.engine.fetch_checkpoint_for_epoch(NET, 2).await.unwrap_err();
    assert!(err.is_pruned());
    assert_eq!(h.chain.rotations.load(Ordering::SeqCst), 0);
    assert_eq!(h.boundaries.lowest(NET), Some(1_500));
}

#[tokio::test]
async fn test_historical_checkpoint_walk_stops_at_boundary() {
    let h = harness(MockChain::new(1_500, 3_700));
    h.engine
        .apply_status_event(NET, 7, CheckpointStatus::Sealed, 2521, None, None)
        .await
        .unwrap();

    let summary = h.engine.sync_historical_checkpoints(NET).await.unwrap();

    // Epochs 10..=5 are reachable; 7 is already stored; 4 sits below 1500.
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.empty, 5);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.stopped_at_epoch, Some(4));
    assert_eq!(h.boundaries.lowest(NET), Some(1_500));
}
