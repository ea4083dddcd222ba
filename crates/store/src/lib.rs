//! Storage contract for the ingestion core.
//!
//! Every write is an upsert keyed by `(network, epoch)` or
//! `(network, validator)` and applied under the store's own lock, so a
//! retried or duplicated write converges to the same record.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chain::{
    CheckpointRecord, CheckpointUpdate, SignatureEntry, Transition, ValidatorSignatureRecord,
};
use thiserror::Error;

pub mod height;
pub mod memory;

pub use height::{FileHeightCache, MemoryHeightCache};
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Query over validator signature records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureFilter {
    pub network: Option<String>,
    pub validator_address: Option<String>,
    pub min_signature_rate: Option<f64>,
    pub max_signature_rate: Option<f64>,
}

impl SignatureFilter {
    pub fn network(network: &str) -> Self {
        Self {
            network: Some(network.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &ValidatorSignatureRecord) -> bool {
        if let Some(n) = &self.network {
            if &record.network != n {
                return false;
            }
        }
        if let Some(a) = &self.validator_address {
            if !record.validator_address.eq_ignore_ascii_case(a) {
                return false;
            }
        }
        if let Some(min) = self.min_signature_rate {
            if record.signature_rate < min {
                return false;
            }
        }
        if let Some(max) = self.max_signature_rate {
            if record.signature_rate > max {
                return false;
            }
        }
        true
    }
}

/// Outcome of a bulk signature write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Records created by this write.
    pub upserted: usize,
    /// Existing records that took the new entry.
    pub modified: usize,
    /// Entries that were replays or too old for the window.
    pub ignored: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_checkpoint(
        &self,
        network: &str,
        epoch: u64,
    ) -> Result<Option<CheckpointRecord>, StoreError>;

    /// Apply `update` to the record keyed by `(network, epoch)`, creating it
    /// if absent, and return the stored result.
    async fn find_one_and_update_checkpoint(
        &self,
        update: CheckpointUpdate,
    ) -> Result<(CheckpointRecord, Transition), StoreError>;

    /// Epochs with a stored checkpoint for `network`.
    async fn checkpoint_epochs(&self, network: &str) -> Result<BTreeSet<u64>, StoreError>;

    async fn find_validator_signatures(
        &self,
        filter: &SignatureFilter,
    ) -> Result<Vec<ValidatorSignatureRecord>, StoreError>;

    /// Addresses with a signature record on `network`.
    async fn known_validators(&self, network: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Push one entry per validator in a single write, creating missing
    /// records.
    async fn bulk_write_validator_signatures(
        &self,
        network: &str,
        entries: Vec<(String, SignatureEntry)>,
    ) -> Result<BulkWriteResult, StoreError>;
}

/// Last processed height per network, with expiry.
#[async_trait]
pub trait HeightCache: Send + Sync {
    async fn get(&self, network: &str) -> Result<Option<u64>, StoreError>;

    async fn set(&self, network: &str, height: u64, ttl: Duration) -> Result<(), StoreError>;
}
