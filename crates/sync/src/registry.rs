//! Validator identities keyed by hex consensus address.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use node_rpc::StakingValidator;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::{ChainSource, ValidatorInfo, ValidatorRegistry};

impl From<&StakingValidator> for ValidatorInfo {
    fn from(v: &StakingValidator) -> Self {
        Self {
            moniker: v.description.moniker.clone(),
            valoper_address: v.operator_address.clone(),
            consensus_address: v.hex_address(),
        }
    }
}

/// In-memory registry. `refresh` replaces a network's set wholesale and
/// wakes everyone blocked in `wait_for_next_refresh`.
#[derive(Default)]
pub struct MemoryValidatorRegistry {
    networks: RwLock<HashMap<String, HashMap<String, ValidatorInfo>>>,
    refreshed: Notify,
}

impl MemoryValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&self, network: &str, validators: Vec<ValidatorInfo>) {
        let set: HashMap<String, ValidatorInfo> = validators
            .into_iter()
            .map(|v| (v.consensus_address.to_ascii_uppercase(), v))
            .collect();
        let count = set.len();
        self.networks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(network.to_string(), set);
        info!(network, count, "validator registry refreshed");
        self.refreshed.notify_waiters();
    }

    pub fn len(&self, network: &str) -> usize {
        self.networks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(network)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl ValidatorRegistry for MemoryValidatorRegistry {
    async fn get_validator_by_hex_address(
        &self,
        network: &str,
        address: &str,
    ) -> Option<ValidatorInfo> {
        self.networks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(network)
            .and_then(|set| set.get(&address.to_ascii_uppercase()))
            .cloned()
    }

    async fn wait_for_next_refresh(&self, _network: &str) {
        self.refreshed.notified().await;
    }
}

/// Reload `network`'s validator set from the node into `registry`.
pub async fn refresh_from_chain(
    chain: &dyn ChainSource,
    registry: &MemoryValidatorRegistry,
    network: &str,
) -> bool {
    match chain.get_validators(network).await {
        Ok(validators) => {
            registry.refresh(network, validators.iter().map(ValidatorInfo::from).collect());
            true
        }
        Err(e) => {
            warn!(network, err = %e, "failed to refresh validator registry");
            false
        }
    }
}
