use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::client::{NodeClient, NODE_HTTP_TIMEOUT_SECS};
use crate::error::NodeRpcError;

/// RPC and REST base URLs of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub rpc_url: String,
    pub rest_url: String,
}

struct Active {
    index: usize,
    client: Arc<NodeClient>,
}

/// The configured nodes of one network with a single active client.
/// Callers rotate to the next node after a failure.
pub struct NodePool {
    network: String,
    endpoints: Vec<Endpoint>,
    timeout: Duration,
    active: RwLock<Active>,
}

impl NodePool {
    pub fn new(network: &str, endpoints: Vec<Endpoint>) -> Result<Self, NodeRpcError> {
        Self::with_timeout(
            network,
            endpoints,
            Duration::from_secs(NODE_HTTP_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        network: &str,
        endpoints: Vec<Endpoint>,
        timeout: Duration,
    ) -> Result<Self, NodeRpcError> {
        let first = endpoints
            .first()
            .ok_or_else(|| NodeRpcError::NoEndpoints(network.to_string()))?;
        let client = NodeClient::with_timeout(&first.rpc_url, &first.rest_url, timeout)?;
        Ok(Self {
            network: network.to_string(),
            endpoints,
            timeout,
            active: RwLock::new(Active {
                index: 0,
                client: Arc::new(client),
            }),
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active.read().unwrap_or_else(|e| e.into_inner()).index
    }

    /// The client currently in use.
    pub fn client(&self) -> Arc<NodeClient> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .client
            .clone()
    }

    /// Switch to the next configured node, wrapping around.
    pub fn rotate(&self) -> Arc<NodeClient> {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if self.endpoints.len() < 2 {
            return active.client.clone();
        }
        let next = (active.index + 1) % self.endpoints.len();
        let ep = &self.endpoints[next];
        match NodeClient::with_timeout(&ep.rpc_url, &ep.rest_url, self.timeout) {
            Ok(client) => {
                info!(
                    network = %self.network,
                    rpc = %ep.rpc_url,
                    "rotated to next node endpoint"
                );
                active.index = next;
                active.client = Arc::new(client);
            }
            Err(e) => {
                warn!(network = %self.network, rpc = %ep.rpc_url, err = %e, "failed to build client for endpoint");
            }
        }
        active.client.clone()
    }
}
