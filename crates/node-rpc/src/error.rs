use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeRpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("height {height} is not yet available (current height {current:?})")]
    HeightNotYetAvailable { height: u64, current: Option<u64> },
    #[error("height {height} has been pruned (lowest available {lowest_available:?})")]
    HeightPruned {
        height: u64,
        lowest_available: Option<u64>,
    },
    #[error("null result from RPC call")]
    NullResult,
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no endpoints configured for network {0}")]
    NoEndpoints(String),
}

impl NodeRpcError {
    /// Transport-level failures worth retrying on another endpoint.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeRpcError::Http(_) | NodeRpcError::NullResult => true,
            NodeRpcError::Status { status, .. } => *status >= 500 || *status == 429,
            NodeRpcError::Rpc { code, .. } => *code == -32603,
            _ => false,
        }
    }

    pub fn is_pruned(&self) -> bool {
        matches!(self, NodeRpcError::HeightPruned { .. })
    }

    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, NodeRpcError::HeightNotYetAvailable { .. })
    }
}

/// Map a node error message to a typed height error.
///
/// CometBFT reports `height 5 is not available, lowest height is 920` for
/// pruned blocks and `height 99 must be less than or equal to the current
/// blockchain height 42` for blocks it has not produced yet. The Cosmos REST
/// gateway wraps the same text in its own `message` field.
pub fn classify_height_error(message: &str, requested: Option<u64>) -> Option<NodeRpcError> {
    let lower = message.to_ascii_lowercase();
    let height = requested
        .or_else(|| number_after(&lower, "height "))
        .unwrap_or(0);

    if lower.contains("lowest height is") || lower.contains("is not available") {
        return Some(NodeRpcError::HeightPruned {
            height,
            lowest_available: number_after(&lower, "lowest height is "),
        });
    }
    if lower.contains("must be less than or equal to the current blockchain height") {
        return Some(NodeRpcError::HeightNotYetAvailable {
            height,
            current: number_after(&lower, "current blockchain height "),
        });
    }
    if lower.contains("greater than the current height")
        || lower.contains("greater than current height")
        || lower.contains("could not find results for height")
    {
        return Some(NodeRpcError::HeightNotYetAvailable {
            height,
            current: None,
        });
    }
    None
}

/// First integer following `marker` in `s`.
fn number_after(s: &str, marker: &str) -> Option<u64> {
    let start = s.find(marker)? + marker.len();
    let digits: String = s[start..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
