//! Built-in message processors.

use std::sync::Arc;

use async_trait::async_trait;
use chain::{AbciEvent, CheckpointPayload, CheckpointStatus, EventKind, TransactionEvent};
use node_rpc::RawCheckpointWithMeta;
use tracing::warn;

use crate::checkpoint::CheckpointLifecycleEngine;
use crate::dispatch::MessageProcessor;
use crate::error::SyncError;
use crate::tracker::BlockHeightTracker;

/// Feeds `NewBlock` events to the height tracker.
pub struct NewBlockProcessor {
    tracker: Arc<BlockHeightTracker>,
}

impl NewBlockProcessor {
    pub fn new(tracker: Arc<BlockHeightTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl MessageProcessor for NewBlockProcessor {
    fn name(&self) -> &'static str {
        "new-block"
    }

    fn can_handle(&self, event: &TransactionEvent) -> bool {
        event.kind == EventKind::NewBlock && event.block.is_some()
    }

    async fn process(&self, event: &TransactionEvent) -> Result<(), SyncError> {
        let Some(block) = event.block.as_deref() else {
            return Ok(());
        };
        self.tracker.observe_block(&event.network, block).await
    }
}

pub const CHECKPOINT_EVENT_PREFIX: &str = "babylon.checkpointing.v1.EventCheckpoint";

/// Applies checkpoint status events (`EventCheckpointSealed`, ...) as
/// forward-only transitions.
pub struct CheckpointEventProcessor {
    engine: Arc<CheckpointLifecycleEngine>,
}

impl CheckpointEventProcessor {
    pub fn new(engine: Arc<CheckpointLifecycleEngine>) -> Self {
        Self { engine }
    }
}

/// Epoch and, when the event carries the full checkpoint, its payload.
fn parse_checkpoint_event(event: &AbciEvent) -> Result<(u64, Option<CheckpointPayload>), SyncError> {
    if let Some(raw) = event.attribute("checkpoint") {
        let ckpt: RawCheckpointWithMeta = serde_json::from_str(raw)
            .map_err(|e| SyncError::Malformed(format!("{}: checkpoint attribute: {e}", event.kind)))?;
        let epoch = ckpt.ckpt.epoch_num.ok_or_else(|| {
            SyncError::InvariantViolation(format!("{} without epoch number", event.kind))
        })?;
        return Ok((epoch, Some(ckpt.payload())));
    }
    let raw = event.attribute("epoch_num").ok_or_else(|| {
        SyncError::InvariantViolation(format!("{} without epoch number", event.kind))
    })?;
    let epoch = raw
        .trim_matches('"')
        .parse()
        .map_err(|_| SyncError::Malformed(format!("{}: epoch_num {raw:?}", event.kind)))?;
    Ok((epoch, None))
}

#[async_trait]
impl MessageProcessor for CheckpointEventProcessor {
    fn name(&self) -> &'static str {
        "checkpoint-events"
    }

    fn can_handle(&self, event: &TransactionEvent) -> bool {
        event.has_event_prefix(CHECKPOINT_EVENT_PREFIX)
    }

    async fn process(&self, event: &TransactionEvent) -> Result<(), SyncError> {
        let mut first_err = None;
        for abci in &event.events {
            let Some(status) = CheckpointStatus::from_event_type(&abci.kind) else {
                continue;
            };
            let res = match parse_checkpoint_event(abci) {
                Ok((epoch, payload)) => self
                    .engine
                    .apply_status_event(
                        &event.network,
                        epoch,
                        status,
                        event.height,
                        event.timestamp,
                        payload,
                    )
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = res {
                warn!(network = %event.network, height = event.height, kind = %abci.kind, err = %e, "skipping checkpoint event");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
