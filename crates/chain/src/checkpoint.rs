use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blocks per epoch.
pub const EPOCH_LENGTH: u64 = 360;

/// Height of the block that carries the injected checkpoint for `epoch`.
pub fn epoch_block_height(epoch: u64) -> u64 {
    epoch * EPOCH_LENGTH + 1
}

/// The epoch whose checkpoint is carried by `height`, if any.
pub fn checkpoint_epoch_at(height: u64) -> Option<u64> {
    if height % EPOCH_LENGTH == 1 {
        Some((height - 1) / EPOCH_LENGTH)
    } else {
        None
    }
}

/// Epoch that `height` belongs to. Every epoch below it has a checkpoint
/// block at or below `height`.
pub fn current_epoch(height: u64) -> u64 {
    height.div_ceil(EPOCH_LENGTH)
}

/// Checkpoint status. Variant order is the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    Accumulating,
    Sealed,
    Submitted,
    Confirmed,
    Finalized,
}

impl CheckpointStatus {
    pub const ALL: [CheckpointStatus; 5] = [
        CheckpointStatus::Accumulating,
        CheckpointStatus::Sealed,
        CheckpointStatus::Submitted,
        CheckpointStatus::Confirmed,
        CheckpointStatus::Finalized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Accumulating => "ACCUMULATING",
            CheckpointStatus::Sealed => "SEALED",
            CheckpointStatus::Submitted => "SUBMITTED",
            CheckpointStatus::Confirmed => "CONFIRMED",
            CheckpointStatus::Finalized => "FINALIZED",
        }
    }

    /// Status announced by a checkpointing event type such as
    /// `babylon.checkpointing.v1.EventCheckpointSealed`.
    pub fn from_event_type(ty: &str) -> Option<Self> {
        let suffix = ty.rsplit('.').next()?.strip_prefix("EventCheckpoint")?;
        suffix.to_ascii_uppercase().parse().ok()
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown checkpoint status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CheckpointStatus {
    type Err = UnknownStatus;

    /// Accepts both `SEALED` and the proto enum name `CKPT_STATUS_SEALED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches("CKPT_STATUS_");
        CheckpointStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// One step of a checkpoint's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    pub state: CheckpointStatus,
    pub block_height: u64,
    pub block_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorVoteRecord {
    pub validator_hex_address: String,
    pub moniker: String,
    pub valoper_address: String,
    pub power: u64,
    pub signed: bool,
    pub vote_extension: Option<Vec<u8>>,
    pub extension_signature: Option<Vec<u8>>,
}

/// Validator participation in one checkpoint, by count and by power.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationStats {
    pub total_validators: u64,
    pub signed_validators: u64,
    pub unsigned_validators: u64,
    pub total_power: u64,
    pub signed_power: u64,
    pub unsigned_power: u64,
    /// `"NN.NN%"`
    pub by_count: String,
    pub by_power: String,
}

impl ParticipationStats {
    pub fn compute(votes: &[ValidatorVoteRecord]) -> Self {
        let total_validators = votes.len() as u64;
        let signed_validators = votes.iter().filter(|v| v.signed).count() as u64;
        let total_power: u64 = votes.iter().map(|v| v.power).sum();
        let signed_power: u64 = votes.iter().filter(|v| v.signed).map(|v| v.power).sum();
        Self {
            total_validators,
            signed_validators,
            unsigned_validators: total_validators - signed_validators,
            total_power,
            signed_power,
            unsigned_power: total_power - signed_power,
            by_count: format_percentage(signed_validators, total_validators),
            by_power: format_percentage(signed_power, total_power),
        }
    }
}

/// `part / whole` as a percentage with two decimals. `"0.00%"` when `whole` is 0.
pub fn format_percentage(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "0.00%".to_string();
    }
    let pct = part as f64 / whole as f64 * 100.0;
    format!("{pct:.2}%")
}

/// Fields carried by the sealed checkpoint itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub block_hash: Vec<u8>,
    pub bitmap: Vec<u8>,
    pub bls_multi_sig: Vec<u8>,
    pub bls_aggregate_public_key: Vec<u8>,
    pub power_sum: u64,
}

/// Stored checkpoint, keyed by `(network, epoch_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub network: String,
    pub epoch_number: u64,
    pub status: CheckpointStatus,
    pub payload: CheckpointPayload,
    pub lifecycle: Vec<LifecycleEntry>,
    pub votes: Vec<ValidatorVoteRecord>,
    pub participation: Option<ParticipationStats>,
    pub timestamp: DateTime<Utc>,
}

/// Result of applying a [`CheckpointUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created(CheckpointStatus),
    Advanced {
        from: CheckpointStatus,
        to: CheckpointStatus,
    },
    Unchanged,
    /// The offered status is behind the stored one and was ignored.
    Stale {
        stored: CheckpointStatus,
        offered: CheckpointStatus,
    },
}

/// Update document for a checkpoint: the observed status plus whatever the
/// observation carried. Applied by the store under its own write lock.
#[derive(Debug, Clone)]
pub struct CheckpointUpdate {
    pub network: String,
    pub epoch_number: u64,
    pub status: CheckpointStatus,
    pub observed_at_height: u64,
    pub observed_at_time: Option<DateTime<Utc>>,
    pub payload: Option<CheckpointPayload>,
    pub votes: Option<Vec<ValidatorVoteRecord>>,
    pub timestamp: DateTime<Utc>,
}

impl CheckpointUpdate {
    pub fn status_only(
        network: &str,
        epoch_number: u64,
        status: CheckpointStatus,
        height: u64,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            network: network.to_string(),
            epoch_number,
            status,
            observed_at_height: height,
            observed_at_time: time,
            payload: None,
            votes: None,
            timestamp: Utc::now(),
        }
    }

    fn entry(&self) -> LifecycleEntry {
        LifecycleEntry {
            state: self.status,
            block_height: self.observed_at_height,
            block_time: self.observed_at_time,
        }
    }

    /// Status moves strictly forward; each forward move appends one
    /// lifecycle entry. Payload and votes overwrite whatever was stored.
    pub fn apply(self, existing: Option<CheckpointRecord>) -> (CheckpointRecord, Transition) {
        let (mut record, transition) = match existing {
            None => {
                let record = CheckpointRecord {
                    network: self.network.clone(),
                    epoch_number: self.epoch_number,
                    status: self.status,
                    payload: CheckpointPayload::default(),
                    lifecycle: vec![self.entry()],
                    votes: Vec::new(),
                    participation: None,
                    timestamp: self.timestamp,
                };
                (record, Transition::Created(self.status))
            }
            Some(mut record) => {
                let transition = if self.status > record.status {
                    let from = record.status;
                    record.status = self.status;
                    record.lifecycle.push(self.entry());
                    Transition::Advanced {
                        from,
                        to: self.status,
                    }
                } else if self.status == record.status {
                    Transition::Unchanged
                } else {
                    Transition::Stale {
                        stored: record.status,
                        offered: self.status,
                    }
                };
                (record, transition)
            }
        };

        if let Some(payload) = self.payload {
            record.payload = payload;
        }
        if let Some(votes) = self.votes {
            record.participation = Some(ParticipationStats::compute(&votes));
            record.votes = votes;
        }
        if !matches!(transition, Transition::Unchanged | Transition::Stale { .. }) {
            record.timestamp = self.timestamp;
        }
        (record, transition)
    }
}
