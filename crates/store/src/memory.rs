use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chain::{
    CheckpointRecord, CheckpointUpdate, SignatureEntry, Transition, ValidatorSignatureRecord,
};

use crate::{BulkWriteResult, SignatureFilter, Store, StoreError};

type CheckpointMap = BTreeMap<(String, u64), CheckpointRecord>;
type SignatureMap = BTreeMap<(String, String), ValidatorSignatureRecord>;

/// Store backed by ordered in-process maps.
#[derive(Default)]
pub struct MemoryStore {
    checkpoints: RwLock<CheckpointMap>,
    signatures: RwLock<SignatureMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct lookup of one validator's record.
    pub fn signature_record(
        &self,
        network: &str,
        address: &str,
    ) -> Result<Option<ValidatorSignatureRecord>, StoreError> {
        let guard = self.signatures.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .get(&(network.to_string(), address.to_string()))
            .cloned())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_checkpoint(
        &self,
        network: &str,
        epoch: u64,
    ) -> Result<Option<CheckpointRecord>, StoreError> {
        let guard = self.checkpoints.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(&(network.to_string(), epoch)).cloned())
    }

    async fn find_one_and_update_checkpoint(
        &self,
        update: CheckpointUpdate,
    ) -> Result<(CheckpointRecord, Transition), StoreError> {
        let mut guard = self.checkpoints.write().map_err(|_| StoreError::Poisoned)?;
        let key = (update.network.clone(), update.epoch_number);
        let existing = guard.remove(&key);
        let (record, transition) = update.apply(existing);
        guard.insert(key, record.clone());
        Ok((record, transition))
    }

    async fn checkpoint_epochs(&self, network: &str) -> Result<BTreeSet<u64>, StoreError> {
        let guard = self.checkpoints.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .keys()
            .filter(|(n, _)| n == network)
            .map(|(_, epoch)| *epoch)
            .collect())
    }

    async fn find_validator_signatures(
        &self,
        filter: &SignatureFilter,
    ) -> Result<Vec<ValidatorSignatureRecord>, StoreError> {
        let guard = self.signatures.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn known_validators(&self, network: &str) -> Result<BTreeSet<String>, StoreError> {
        let guard = self.signatures.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard
            .keys()
            .filter(|(n, _)| n == network)
            .map(|(_, addr)| addr.clone())
            .collect())
    }

    async fn bulk_write_validator_signatures(
        &self,
        network: &str,
        entries: Vec<(String, SignatureEntry)>,
    ) -> Result<BulkWriteResult, StoreError> {
        let mut guard = self.signatures.write().map_err(|_| StoreError::Poisoned)?;
        let mut result = BulkWriteResult::default();
        for (address, entry) in entries {
            let key = (network.to_string(), address);
            let created = !guard.contains_key(&key);
            let record = guard
                .entry(key)
                .or_insert_with_key(|(n, a)| ValidatorSignatureRecord::new(n, a));
            if record.record(entry) {
                if created {
                    result.upserted += 1;
                } else {
                    result.modified += 1;
                }
            } else {
                result.ignored += 1;
            }
        }
        Ok(result)
    }
}
