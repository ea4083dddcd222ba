use std::collections::BTreeSet;
use std::sync::Arc;

use chain::{Block, SignatureEntry, ValidatorSignatureRecord};
use store::{BulkWriteResult, SignatureFilter, Store};
use tracing::debug;

use crate::error::SyncError;

/// Folds each block's commit into the per-validator signing history.
pub struct ValidatorSignatureTracker {
    store: Arc<dyn Store>,
}

impl ValidatorSignatureTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record one entry per validator for the commit carried by `block`.
    /// Validators seen earlier but absent from this commit are recorded as
    /// missed.
    pub async fn track_block(
        &self,
        network: &str,
        block: &Block,
    ) -> Result<BulkWriteResult, SyncError> {
        let Some(commit) = block.last_commit.as_ref() else {
            return Ok(BulkWriteResult::default());
        };
        if commit.height == 0 || commit.signatures.is_empty() {
            return Ok(BulkWriteResult::default());
        }

        let signers = commit.signers();
        let mut validators: BTreeSet<String> = commit.participants();
        validators.extend(self.store.known_validators(network).await?);

        let entries: Vec<(String, SignatureEntry)> = validators
            .into_iter()
            .map(|addr| {
                let entry = SignatureEntry {
                    block_height: commit.height,
                    signed: signers.contains(&addr),
                    round: commit.round,
                    timestamp: block.time,
                };
                (addr, entry)
            })
            .collect();

        let result = self
            .store
            .bulk_write_validator_signatures(network, entries)
            .await?;
        debug!(
            network,
            height = commit.height,
            signed = signers.len(),
            upserted = result.upserted,
            modified = result.modified,
            ignored = result.ignored,
            "tracked block signatures"
        );
        Ok(result)
    }

    pub async fn get_validator_signatures(
        &self,
        filter: &SignatureFilter,
    ) -> Result<Vec<ValidatorSignatureRecord>, SyncError> {
        Ok(self.store.find_validator_signatures(filter).await?)
    }

    /// Missed blocks of `validator` within `[from, to]`, as far back as the
    /// rolling window reaches.
    pub async fn get_validator_missed_blocks(
        &self,
        network: &str,
        validator: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<SignatureEntry>, SyncError> {
        let filter = SignatureFilter {
            network: Some(network.to_string()),
            validator_address: Some(validator.to_string()),
            ..SignatureFilter::default()
        };
        let records = self.store.find_validator_signatures(&filter).await?;
        Ok(records
            .first()
            .map(|r| r.missed_in_range(from, to))
            .unwrap_or_default())
    }
}
