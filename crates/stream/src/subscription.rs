use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A standing event filter on a stream connection. The `id` is echoed back
/// on every frame the subscription produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub query: String,
}

impl Subscription {
    pub fn new(id: &str, query: &str) -> Self {
        Self {
            id: id.to_string(),
            query: query.to_string(),
        }
    }

    /// Every new block, with its commit and finalize-block events.
    pub fn new_blocks() -> Self {
        Self::new("new-block", "tm.event='NewBlock'")
    }

    /// Transactions emitting checkpoint status events.
    pub fn checkpoint_events() -> Self {
        Self::new(
            "checkpoint-events",
            "tm.event='Tx' AND message.module='checkpointing'",
        )
    }

    pub fn subscribe_request(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "subscribe",
            "id": self.id,
            "params": { "query": self.query }
        })
    }

    pub fn unsubscribe_request(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "unsubscribe",
            "id": self.id,
            "params": { "query": self.query }
        })
    }
}
