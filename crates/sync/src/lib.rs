//! Ingestion core: height tracking and gap backfill, event dispatch,
//! checkpoint lifecycle and validator signature tracking.

pub mod backfill;
pub mod boundary;
pub mod checkpoint;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod processors;
pub mod registry;
pub mod retry;
pub mod signatures;
pub mod tracker;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chain::Block;
use node_rpc::{NodePool, NodeRpcError, RawCheckpointWithMeta, StakingValidator};
use serde_json::Value;

pub use backfill::{BackfillConfig, MissedRangeProcessor, RangeOutcome};
pub use boundary::PruningBoundaries;
pub use checkpoint::{CheckpointConfig, CheckpointLifecycleEngine, HistoricalCheckpointSummary};
pub use dispatch::{EventDispatchRegistry, MessageProcessor};
pub use error::SyncError;
pub use pipeline::BlockPipeline;
pub use processors::{CheckpointEventProcessor, NewBlockProcessor};
pub use registry::MemoryValidatorRegistry;
pub use retry::RetryPolicy;
pub use signatures::ValidatorSignatureTracker;
pub use tracker::{BlockHeightTracker, TrackerConfig};

// ---------------------------------------------------------------------------
// Traits for testability
// ---------------------------------------------------------------------------

/// Chain data for every configured network.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn get_current_height(&self, network: &str) -> Result<u64, NodeRpcError>;

    async fn get_block_by_height(&self, network: &str, height: u64)
        -> Result<Block, NodeRpcError>;

    async fn get_block_by_hash(&self, network: &str, hash: &str) -> Result<Block, NodeRpcError>;

    /// Decoded transaction messages of a block, in order.
    async fn get_block_messages(
        &self,
        network: &str,
        height: u64,
    ) -> Result<Vec<Value>, NodeRpcError>;

    async fn get_raw_checkpoint(
        &self,
        network: &str,
        epoch: u64,
    ) -> Result<RawCheckpointWithMeta, NodeRpcError>;

    async fn get_validators(&self, network: &str) -> Result<Vec<StakingValidator>, NodeRpcError>;

    /// Switch `network` to its next node endpoint.
    fn rotate_endpoint(&self, network: &str);
}

/// Display identity of a validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub moniker: String,
    pub valoper_address: String,
    /// Upper-case hex consensus address.
    pub consensus_address: String,
}

#[async_trait]
pub trait ValidatorRegistry: Send + Sync {
    async fn get_validator_by_hex_address(
        &self,
        network: &str,
        address: &str,
    ) -> Option<ValidatorInfo>;

    /// Resolves after the next refresh of the registry.
    async fn wait_for_next_refresh(&self, network: &str);
}

/// [`ChainSource`] over one [`NodePool`] per network.
#[derive(Default)]
pub struct NodeRouter {
    pools: HashMap<String, Arc<NodePool>>,
}

impl NodeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pool: NodePool) {
        self.pools
            .insert(pool.network().to_string(), Arc::new(pool));
    }

    pub fn pool(&self, network: &str) -> Result<&Arc<NodePool>, NodeRpcError> {
        self.pools
            .get(network)
            .ok_or_else(|| NodeRpcError::NoEndpoints(network.to_string()))
    }

    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }
}

#[async_trait]
impl ChainSource for NodeRouter {
    async fn get_current_height(&self, network: &str) -> Result<u64, NodeRpcError> {
        self.pool(network)?.client().get_current_height().await
    }

    async fn get_block_by_height(
        &self,
        network: &str,
        height: u64,
    ) -> Result<Block, NodeRpcError> {
        self.pool(network)?.client().get_block_by_height(height).await
    }

    async fn get_block_by_hash(&self, network: &str, hash: &str) -> Result<Block, NodeRpcError> {
        self.pool(network)?.client().get_block_by_hash(hash).await
    }

    async fn get_block_messages(
        &self,
        network: &str,
        height: u64,
    ) -> Result<Vec<Value>, NodeRpcError> {
        self.pool(network)?.client().get_block_messages(height).await
    }

    async fn get_raw_checkpoint(
        &self,
        network: &str,
        epoch: u64,
    ) -> Result<RawCheckpointWithMeta, NodeRpcError> {
        self.pool(network)?.client().get_raw_checkpoint(epoch).await
    }

    async fn get_validators(&self, network: &str) -> Result<Vec<StakingValidator>, NodeRpcError> {
        self.pool(network)?.client().get_validators().await
    }

    fn rotate_endpoint(&self, network: &str) {
        if let Ok(pool) = self.pool(network) {
            pool.rotate();
        }
    }
}
