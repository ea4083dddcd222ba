//! Replays ranges of already-produced blocks through the block pipeline.

use std::sync::Arc;
use std::time::Duration;

use chain::Block;
use node_rpc::NodeRpcError;
use tracing::{debug, info, warn};

use crate::boundary::PruningBoundaries;
use crate::error::SyncError;
use crate::pipeline::BlockPipeline;
use crate::retry::RetryPolicy;
use crate::ChainSource;

pub const BACKFILL_BATCH_SIZE: u64 = 20;
pub const INTER_BATCH_DELAY: Duration = Duration::from_millis(200);
/// Consecutive failed heights before a scan is abandoned.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Default ceiling on blocks replayed by one historical sync.
pub const HISTORICAL_SYNC_BLOCKS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
pub struct BackfillConfig {
    pub batch_size: u64,
    pub inter_batch_delay: Duration,
    pub retry: RetryPolicy,
    pub max_consecutive_failures: u32,
    pub historical_sync_blocks: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: BACKFILL_BATCH_SIZE,
            inter_batch_delay: INTER_BATCH_DELAY,
            retry: RetryPolicy::default(),
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            historical_sync_blocks: HISTORICAL_SYNC_BLOCKS,
        }
    }
}

/// What a range replay covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOutcome {
    pub from: u64,
    pub to: u64,
    pub processed: u64,
    pub failed: u64,
    /// Lowest available height, when the node had pruned part of the range.
    pub pruned_below: Option<u64>,
    /// First height the node had not produced yet; the replay ended there.
    pub stopped_at: Option<u64>,
    /// Lowest height that could not be fetched or processed.
    pub first_failed: Option<u64>,
}

impl RangeOutcome {
    /// Highest height up to which nothing is left to replay.
    pub fn completed_through(&self) -> u64 {
        match (self.stopped_at, self.first_failed) {
            (Some(a), Some(b)) => a.min(b).saturating_sub(1),
            (Some(h), None) | (None, Some(h)) => h.saturating_sub(1),
            (None, None) => self.to,
        }
    }

    fn record_failure(&mut self, height: u64) {
        self.failed += 1;
        self.first_failed.get_or_insert(height);
    }
}

pub struct MissedRangeProcessor {
    chain: Arc<dyn ChainSource>,
    pipeline: Arc<BlockPipeline>,
    boundaries: Arc<PruningBoundaries>,
    config: BackfillConfig,
}

impl MissedRangeProcessor {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        pipeline: Arc<BlockPipeline>,
        boundaries: Arc<PruningBoundaries>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            chain,
            pipeline,
            boundaries,
            config,
        }
    }

    pub fn pipeline(&self) -> &Arc<BlockPipeline> {
        &self.pipeline
    }

    pub fn chain(&self) -> &Arc<dyn ChainSource> {
        &self.chain
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    async fn fetch_block(&self, network: &str, height: u64) -> Result<Block, NodeRpcError> {
        let chain = &self.chain;
        self.config
            .retry
            .run(
                || chain.get_block_by_height(network, height),
                |e| e.is_transient() || e.is_not_yet_available(),
                |_| chain.rotate_endpoint(network),
            )
            .await
    }

    /// Replay `[from, to]` in order. A pruned prefix is skipped and the
    /// boundary recorded; only a sustained run of failures is an error.
    /// Isolated failures are reported through `first_failed` so callers do
    /// not advance past them.
    pub async fn process_range(
        &self,
        network: &str,
        from: u64,
        to: u64,
    ) -> Result<RangeOutcome, SyncError> {
        let mut outcome = RangeOutcome {
            from,
            to,
            ..RangeOutcome::default()
        };
        if from > to {
            return Ok(outcome);
        }

        let mut height = from;
        if let Some(lowest) = self.boundaries.lowest(network) {
            if lowest > height {
                outcome.pruned_below = Some(lowest);
                height = lowest;
            }
        }

        info!(network, from, to, "processing missed range");
        let mut consecutive_failures = 0u32;
        let mut in_batch = 0u64;
        while height <= to {
            match self.fetch_block(network, height).await {
                Ok(block) => {
                    if self.pipeline.process_block(network, &block).await {
                        outcome.processed += 1;
                        consecutive_failures = 0;
                    } else {
                        outcome.record_failure(height);
                        consecutive_failures += 1;
                        warn!(network, height, "block processing failed");
                    }
                }
                Err(NodeRpcError::HeightPruned {
                    lowest_available, ..
                }) => match lowest_available {
                    Some(lowest) if lowest > height => {
                        self.boundaries.record(network, lowest);
                        outcome.pruned_below = Some(lowest);
                        info!(network, height, lowest_available = lowest, "range truncated at pruning boundary");
                        height = lowest;
                        continue;
                    }
                    _ => {
                        self.boundaries.record(network, height + 1);
                        outcome.pruned_below = Some(height + 1);
                        warn!(network, height, "height pruned without a usable boundary, skipping");
                    }
                },
                Err(NodeRpcError::HeightNotYetAvailable { .. }) => {
                    outcome.stopped_at = Some(height);
                    debug!(network, height, "reached node tip, stopping range");
                    break;
                }
                Err(e) => {
                    outcome.record_failure(height);
                    consecutive_failures += 1;
                    warn!(network, height, err = %e, "failed to fetch block");
                }
            }
            if consecutive_failures >= self.config.max_consecutive_failures {
                return Err(SyncError::TooManyFailures {
                    network: network.to_string(),
                    failures: consecutive_failures,
                });
            }

            height += 1;
            in_batch += 1;
            if in_batch >= self.config.batch_size && height <= to {
                in_batch = 0;
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        info!(
            network,
            from,
            to,
            processed = outcome.processed,
            failed = outcome.failed,
            first_failed = ?outcome.first_failed,
            pruned_below = ?outcome.pruned_below,
            "missed range done"
        );
        Ok(outcome)
    }

    /// Replay up to `block_count` blocks starting at `from_height`. Defaults
    /// to the most recent `historical_sync_blocks` blocks.
    pub async fn start_historical_sync(
        &self,
        network: &str,
        from_height: Option<u64>,
        block_count: Option<u64>,
    ) -> Result<RangeOutcome, SyncError> {
        let current = self.chain.get_current_height(network).await?;
        let count = block_count
            .unwrap_or(self.config.historical_sync_blocks)
            .max(1);
        let from = from_height
            .unwrap_or_else(|| current.saturating_sub(count) + 1)
            .max(1);
        let to = from.saturating_add(count - 1).min(current);
        info!(network, from, to, current_height = current, "starting historical sync");
        self.process_range(network, from, to).await
    }
}
