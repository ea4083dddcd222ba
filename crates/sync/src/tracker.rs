//! Last processed height per network, gap detection and catch-up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chain::{Block, NetworkStreamState};
use chrono::Utc;
use store::HeightCache;
use tracing::{debug, info, warn};

use crate::backfill::{MissedRangeProcessor, RangeOutcome};
use crate::error::SyncError;

/// Expiry of a persisted height.
pub const HEIGHT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub height_cache_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            height_cache_ttl: HEIGHT_CACHE_TTL,
        }
    }
}

#[derive(Default)]
struct Slot {
    state: Mutex<NetworkStreamState>,
    /// Held across gap check, backfill and advance. The flag records whether
    /// the persisted height has been loaded.
    gate: tokio::sync::Mutex<bool>,
}

impl Slot {
    fn state(&self) -> MutexGuard<'_, NetworkStreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct BlockHeightTracker {
    backfill: Arc<MissedRangeProcessor>,
    cache: Arc<dyn HeightCache>,
    config: TrackerConfig,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl BlockHeightTracker {
    pub fn new(
        backfill: Arc<MissedRangeProcessor>,
        cache: Arc<dyn HeightCache>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            backfill,
            cache,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn backfill(&self) -> &Arc<MissedRangeProcessor> {
        &self.backfill
    }

    fn slot(&self, network: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(network.to_string()).or_default().clone()
    }

    async fn load_once(&self, network: &str, slot: &Slot, loaded: &mut bool) {
        if *loaded {
            return;
        }
        match self.cache.get(network).await {
            Ok(Some(height)) => {
                slot.state().advance(height);
                info!(network, height, "resuming from persisted height");
            }
            Ok(None) => debug!(network, "no persisted height"),
            Err(e) => warn!(network, err = %e, "failed to load persisted height"),
        }
        *loaded = true;
    }

    async fn persist(&self, network: &str, height: u64) {
        if let Err(e) = self
            .cache
            .set(network, height, self.config.height_cache_ttl)
            .await
        {
            warn!(network, height, err = %e, "failed to persist height");
        }
    }

    /// Advance to `height`, first replaying any gap since the last processed
    /// height. `live` is processed inside the same critical section.
    async fn advance_to(
        &self,
        network: &str,
        height: u64,
        live: Option<&Block>,
    ) -> Result<(), SyncError> {
        let slot = self.slot(network);
        let mut loaded = slot.gate.lock().await;
        self.load_once(network, &slot, &mut loaded).await;

        let gap = slot.state().gap_before(height);
        let mut target = height;
        let mut backfill_err = None;
        if let Some((from, to)) = gap {
            info!(network, from, to, missed = to - from + 1, "gap detected");
            match self.backfill.process_range(network, from, to).await {
                Ok(outcome) if outcome.completed_through() < to => {
                    target = outcome.completed_through();
                    warn!(
                        network,
                        from,
                        to,
                        completed_through = target,
                        "gap not fully replayed, holding height"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(network, from, to, err = %e, "gap backfill failed, height not advanced");
                    backfill_err = Some(e);
                }
            }
        }

        if let Some(block) = live {
            if !self.backfill.pipeline().process_block(network, block).await {
                warn!(network, height, "live block processing failed, height not advanced");
                target = target.min(height.saturating_sub(1));
            }
        }

        if let Some(e) = backfill_err {
            return Err(e);
        }
        let advanced = slot.state().advance(target);
        if advanced {
            self.persist(network, target).await;
        }
        Ok(())
    }

    /// Record that `height` was observed, replaying any gap first.
    pub async fn update_height(&self, network: &str, height: u64) -> Result<(), SyncError> {
        self.advance_to(network, height, None).await
    }

    /// Process a live block: replay the gap before it, run it through the
    /// pipeline, then advance.
    pub async fn observe_block(&self, network: &str, block: &Block) -> Result<(), SyncError> {
        self.advance_to(network, block.height, Some(block)).await
    }

    /// Catch up to the node's current height after a (re)connect. The
    /// replay never reaches further back than `historical_sync_blocks`.
    /// Returns the replayed range.
    pub async fn handle_reconnection(
        &self,
        network: &str,
    ) -> Result<Option<RangeOutcome>, SyncError> {
        let slot = self.slot(network);
        let mut loaded = slot.gate.lock().await;
        self.load_once(network, &slot, &mut loaded).await;

        let current = self.backfill.chain().get_current_height(network).await?;
        let ceiling = self.backfill.config().historical_sync_blocks.max(1);
        let floor = current.saturating_sub(ceiling) + 1;
        let last = slot.state().last_processed_height;
        let from = match last {
            Some(last) => last.saturating_add(1).max(floor),
            None => floor,
        };
        if from > current {
            debug!(network, current_height = current, "already caught up");
            return Ok(None);
        }
        if let Some(last) = last {
            if from > last + 1 {
                warn!(network, last, from, "outage exceeds catch-up ceiling, skipping older heights");
            }
        }

        let outcome = self.backfill.process_range(network, from, current).await?;
        let target = outcome.completed_through();
        let advanced = slot.state().advance(target);
        if advanced {
            self.persist(network, target).await;
        }
        Ok(Some(outcome))
    }

    pub fn state(&self, network: &str) -> NetworkStreamState {
        self.slot(network).state().clone()
    }

    pub fn last_processed_height(&self, network: &str) -> Option<u64> {
        self.slot(network).state().last_processed_height
    }

    pub fn mark_connected(&self, network: &str) {
        self.slot(network).state().mark_connected(Utc::now());
    }

    pub fn mark_disconnected(&self, network: &str) {
        self.slot(network).state().mark_disconnected(Utc::now());
    }
}
