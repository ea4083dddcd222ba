//! Checkpoint lifecycle: locate the injected checkpoint of an epoch, store
//! its status transitions and its validator participation.

use std::sync::Arc;
use std::time::Duration;

use chain::checkpoint::{current_epoch, epoch_block_height};
use chain::{
    CheckpointPayload, CheckpointRecord, CheckpointStatus, CheckpointUpdate, Transition,
    ValidatorVoteRecord,
};
use chrono::{DateTime, Utc};
use node_rpc::types::{ExtendedCommitInfo, ExtendedVoteInfo};
use node_rpc::{message_type, InjectedCheckpoint, NodeRpcError, MSG_INJECTED_CHECKPOINT};
use serde_json::Value;
use store::Store;
use tracing::{debug, info, warn};

use crate::boundary::PruningBoundaries;
use crate::error::SyncError;
use crate::retry::RetryPolicy;
use crate::{ChainSource, ValidatorInfo, ValidatorRegistry};

/// How long to wait for a registry refresh when a vote names an unknown
/// validator.
pub const REGISTRY_WAIT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    pub retry: RetryPolicy,
    pub registry_wait: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            registry_wait: REGISTRY_WAIT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoricalCheckpointSummary {
    pub fetched: u64,
    /// Epochs already recorded before the walk.
    pub skipped: u64,
    /// Epochs whose block carried no injected checkpoint.
    pub empty: u64,
    pub failed: u64,
    /// Epoch at which the walk hit the pruning boundary.
    pub stopped_at_epoch: Option<u64>,
}

pub struct CheckpointLifecycleEngine {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn Store>,
    registry: Arc<dyn ValidatorRegistry>,
    boundaries: Arc<PruningBoundaries>,
    config: CheckpointConfig,
}

impl CheckpointLifecycleEngine {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn Store>,
        registry: Arc<dyn ValidatorRegistry>,
        boundaries: Arc<PruningBoundaries>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            chain,
            store,
            registry,
            boundaries,
            config,
        }
    }

    pub async fn get_checkpoint_by_epoch(
        &self,
        network: &str,
        epoch: u64,
    ) -> Result<Option<CheckpointRecord>, SyncError> {
        Ok(self.store.find_checkpoint(network, epoch).await?)
    }

    /// Fetch the block carrying `epoch`'s checkpoint and store what it holds.
    ///
    /// Returns `Ok(None)` when the block has no injected checkpoint. A bad
    /// checkpoint message is logged and skipped; its error is returned only
    /// if no other message in the block succeeded.
    pub async fn fetch_checkpoint_for_epoch(
        &self,
        network: &str,
        epoch: u64,
    ) -> Result<Option<CheckpointRecord>, SyncError> {
        let height = epoch_block_height(epoch);
        if let Some(lowest) = self.boundaries.lowest(network) {
            if height < lowest {
                return Err(SyncError::HeightPruned {
                    height,
                    lowest_available: Some(lowest),
                });
            }
        }

        let messages = self.fetch_messages(network, height).await?;

        let mut stored = None;
        let mut first_err = None;
        for msg in messages
            .iter()
            .filter(|m| message_type(m) == Some(MSG_INJECTED_CHECKPOINT))
        {
            match self.apply_injected(network, epoch, height, msg).await {
                Ok(record) => stored = Some(record),
                Err(e) => {
                    warn!(network, epoch, height, err = %e, "skipping checkpoint message");
                    first_err.get_or_insert(e);
                }
            }
        }

        match (stored, first_err) {
            (Some(record), _) => Ok(Some(record)),
            (None, Some(e)) => Err(e),
            (None, None) => {
                debug!(network, epoch, height, "no injected checkpoint in block");
                Ok(None)
            }
        }
    }

    /// Block messages at `height`, retrying not-yet-available and transient
    /// errors on the next endpoint. A pruning error records the boundary.
    async fn fetch_messages(&self, network: &str, height: u64) -> Result<Vec<Value>, SyncError> {
        let chain = &self.chain;
        let res = self
            .config
            .retry
            .run(
                || chain.get_block_messages(network, height),
                |e| e.is_not_yet_available() || e.is_transient(),
                |e| {
                    debug!(network, height, err = %e, "rotating endpoint before retry");
                    chain.rotate_endpoint(network);
                },
            )
            .await;

        match res {
            Ok(messages) => Ok(messages),
            Err(NodeRpcError::HeightPruned {
                height,
                lowest_available,
            }) => {
                self.boundaries
                    .record(network, lowest_available.unwrap_or(height + 1));
                Err(SyncError::HeightPruned {
                    height,
                    lowest_available,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_injected(
        &self,
        network: &str,
        epoch: u64,
        height: u64,
        msg: &Value,
    ) -> Result<CheckpointRecord, SyncError> {
        let injected: InjectedCheckpoint = serde_json::from_value(msg.clone())
            .map_err(|e| SyncError::Malformed(format!("injected checkpoint: {e}")))?;
        let msg_epoch = injected.ckpt.ckpt.epoch_num.ok_or_else(|| {
            SyncError::InvariantViolation(format!(
                "checkpoint at height {height} has no epoch number"
            ))
        })?;
        if msg_epoch != epoch {
            warn!(
                network,
                expected = epoch,
                found = msg_epoch,
                "checkpoint epoch differs from block epoch"
            );
        }

        let status = match injected.ckpt.status() {
            Some(s) => s,
            None => self.lookup_status(network, msg_epoch).await,
        };
        let votes = self
            .resolve_votes(network, injected.extended_commit_info.as_ref())
            .await?;
        let observed_at_time = injected
            .ckpt
            .lifecycle()
            .into_iter()
            .find(|e| e.state == status)
            .and_then(|e| e.block_time);

        let update = CheckpointUpdate {
            network: network.to_string(),
            epoch_number: msg_epoch,
            status,
            observed_at_height: height,
            observed_at_time,
            payload: Some(injected.ckpt.payload()),
            votes: Some(votes),
            timestamp: Utc::now(),
        };
        let (record, transition) = self.store.find_one_and_update_checkpoint(update).await?;
        log_transition(network, msg_epoch, transition);
        Ok(record)
    }

    /// Status from the raw-checkpoint endpoint, `SEALED` if unavailable.
    async fn lookup_status(&self, network: &str, epoch: u64) -> CheckpointStatus {
        match self.chain.get_raw_checkpoint(network, epoch).await {
            Ok(raw) => raw.status().unwrap_or(CheckpointStatus::Sealed),
            Err(e) => {
                debug!(network, epoch, err = %e, "raw checkpoint lookup failed");
                CheckpointStatus::Sealed
            }
        }
    }

    async fn lookup_all(
        &self,
        network: &str,
        votes: &[ExtendedVoteInfo],
    ) -> Vec<Option<ValidatorInfo>> {
        let mut out = Vec::with_capacity(votes.len());
        for vote in votes {
            out.push(
                self.registry
                    .get_validator_by_hex_address(network, &vote.validator.address)
                    .await,
            );
        }
        out
    }

    /// Resolve every vote to a validator identity, waiting for one registry
    /// refresh if any is unknown.
    async fn resolve_votes(
        &self,
        network: &str,
        info: Option<&ExtendedCommitInfo>,
    ) -> Result<Vec<ValidatorVoteRecord>, SyncError> {
        let Some(info) = info else {
            return Ok(Vec::new());
        };

        let mut resolved = self.lookup_all(network, &info.votes).await;
        if let Some(pos) = resolved.iter().position(Option::is_none) {
            info!(
                network,
                address = %info.votes[pos].validator.address,
                "unknown validator in checkpoint votes, waiting for registry refresh"
            );
            if tokio::time::timeout(
                self.config.registry_wait,
                self.registry.wait_for_next_refresh(network),
            )
            .await
            .is_err()
            {
                warn!(network, "timed out waiting for validator registry refresh");
            }
            resolved = self.lookup_all(network, &info.votes).await;
            if let Some(pos) = resolved.iter().position(Option::is_none) {
                return Err(SyncError::UnknownValidator {
                    network: network.to_string(),
                    address: info.votes[pos].validator.address.clone(),
                });
            }
        }

        Ok(info
            .votes
            .iter()
            .zip(resolved.into_iter().flatten())
            .map(|(vote, identity)| {
                let signed = vote.flag().is_commit();
                ValidatorVoteRecord {
                    validator_hex_address: vote.validator.address.clone(),
                    moniker: identity.moniker,
                    valoper_address: identity.valoper_address,
                    power: vote.validator.power,
                    signed,
                    vote_extension: vote.vote_extension.clone().filter(|_| signed),
                    extension_signature: vote.extension_signature.clone().filter(|_| signed),
                }
            })
            .collect())
    }

    /// Apply a status announced by a checkpoint event.
    pub async fn apply_status_event(
        &self,
        network: &str,
        epoch: u64,
        status: CheckpointStatus,
        height: u64,
        time: Option<DateTime<Utc>>,
        payload: Option<CheckpointPayload>,
    ) -> Result<(CheckpointRecord, Transition), SyncError> {
        let mut update = CheckpointUpdate::status_only(network, epoch, status, height, time);
        update.payload = payload;
        let (record, transition) = self.store.find_one_and_update_checkpoint(update).await?;
        log_transition(network, epoch, transition);
        Ok((record, transition))
    }

    /// Walk epochs backward from the last completed one, fetching those not
    /// yet recorded. Stops for good at the first pruned epoch.
    pub async fn sync_historical_checkpoints(
        &self,
        network: &str,
    ) -> Result<HistoricalCheckpointSummary, SyncError> {
        let current = self.chain.get_current_height(network).await?;
        let recorded = self.store.checkpoint_epochs(network).await?;
        let mut summary = HistoricalCheckpointSummary::default();

        info!(network, current_height = current, "starting historical checkpoint sync");
        for epoch in (0..current_epoch(current)).rev() {
            if recorded.contains(&epoch) {
                summary.skipped += 1;
                continue;
            }
            if self.boundaries.is_pruned(network, epoch_block_height(epoch)) {
                summary.stopped_at_epoch = Some(epoch);
                break;
            }
            match self.fetch_checkpoint_for_epoch(network, epoch).await {
                Ok(Some(_)) => summary.fetched += 1,
                Ok(None) => summary.empty += 1,
                Err(e) if e.is_pruned() => {
                    summary.stopped_at_epoch = Some(epoch);
                    break;
                }
                Err(e) => {
                    warn!(network, epoch, err = %e, "historical checkpoint fetch failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            network,
            fetched = summary.fetched,
            skipped = summary.skipped,
            failed = summary.failed,
            stopped_at_epoch = ?summary.stopped_at_epoch,
            "historical checkpoint sync finished"
        );
        Ok(summary)
    }
}

fn log_transition(network: &str, epoch: u64, transition: Transition) {
    match transition {
        Transition::Created(status) => {
            info!(network, epoch, status = %status, "checkpoint recorded")
        }
        Transition::Advanced { from, to } => {
            info!(network, epoch, from = %from, to = %to, "checkpoint status advanced")
        }
        Transition::Unchanged => debug!(network, epoch, "checkpoint status unchanged"),
        Transition::Stale { stored, offered } => debug!(
            network,
            epoch,
            stored = %stored,
            offered = %offered,
            "ignoring stale checkpoint status"
        ),
    }
}
