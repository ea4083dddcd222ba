use std::sync::Arc;

use chain::checkpoint::checkpoint_epoch_at;
use chain::Block;
use tracing::warn;

use crate::checkpoint::CheckpointLifecycleEngine;
use crate::signatures::ValidatorSignatureTracker;

/// Per-block processing shared by live blocks and backfill.
pub struct BlockPipeline {
    signatures: Arc<ValidatorSignatureTracker>,
    checkpoints: Arc<CheckpointLifecycleEngine>,
    checkpoint_sync: bool,
}

impl BlockPipeline {
    pub fn new(
        signatures: Arc<ValidatorSignatureTracker>,
        checkpoints: Arc<CheckpointLifecycleEngine>,
        checkpoint_sync: bool,
    ) -> Self {
        Self {
            signatures,
            checkpoints,
            checkpoint_sync,
        }
    }

    pub fn signatures(&self) -> &Arc<ValidatorSignatureTracker> {
        &self.signatures
    }

    pub fn checkpoints(&self) -> &Arc<CheckpointLifecycleEngine> {
        &self.checkpoints
    }

    /// Track signatures and, on epoch boundaries, fetch the checkpoint.
    /// The two run concurrently; a failure in either is logged and does not
    /// affect the other. Returns false if either failed in a way a later
    /// replay of the block could fix.
    pub async fn process_block(&self, network: &str, block: &Block) -> bool {
        let signatures = self.signatures.track_block(network, block);
        let checkpoint = async {
            match checkpoint_epoch_at(block.height) {
                Some(epoch) if self.checkpoint_sync => self
                    .checkpoints
                    .fetch_checkpoint_for_epoch(network, epoch)
                    .await
                    .map(|_| ()),
                _ => Ok(()),
            }
        };

        let (sig_res, ckpt_res) = tokio::join!(signatures, checkpoint);
        let mut ok = true;
        if let Err(e) = sig_res {
            warn!(network, height = block.height, err = %e, "signature tracking failed");
            ok &= !e.is_retryable();
        }
        if let Err(e) = ckpt_res {
            warn!(network, height = block.height, err = %e, "checkpoint detection failed");
            ok &= !e.is_retryable();
        }
        ok
    }
}
