pub mod client;
pub mod error;
pub mod pool;
pub mod types;

pub use client::NodeClient;
pub use error::{classify_height_error, NodeRpcError};
pub use pool::{Endpoint, NodePool};
pub use types::{
    message_type, BlockResponse, InjectedCheckpoint, RawCheckpointWithMeta, StakingValidator,
    StatusResponse, MSG_INJECTED_CHECKPOINT,
};
