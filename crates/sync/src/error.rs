use node_rpc::NodeRpcError;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(NodeRpcError),
    #[error("height {height} not yet available (current {current:?})")]
    HeightNotYetAvailable { height: u64, current: Option<u64> },
    #[error("height {height} pruned (lowest available {lowest_available:?})")]
    HeightPruned {
        height: u64,
        lowest_available: Option<u64>,
    },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("unknown validator {address} on {network}")]
    UnknownValidator { network: String, address: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{failures} consecutive failures on {network}, giving up")]
    TooManyFailures { network: String, failures: u32 },
}

impl From<NodeRpcError> for SyncError {
    fn from(e: NodeRpcError) -> Self {
        match e {
            NodeRpcError::HeightPruned {
                height,
                lowest_available,
            } => SyncError::HeightPruned {
                height,
                lowest_available,
            },
            NodeRpcError::HeightNotYetAvailable { height, current } => {
                SyncError::HeightNotYetAvailable { height, current }
            }
            NodeRpcError::Json(e) => SyncError::Malformed(e.to_string()),
            NodeRpcError::Malformed(m) => SyncError::Malformed(m),
            other => SyncError::Transport(other),
        }
    }
}

impl SyncError {
    pub fn is_pruned(&self) -> bool {
        matches!(self, SyncError::HeightPruned { .. })
    }

    /// Whether the same work can succeed on a later attempt. Pruned heights
    /// and bad payloads never will.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::HeightPruned { .. }
                | SyncError::Malformed(_)
                | SyncError::InvariantViolation(_)
        )
    }
}
