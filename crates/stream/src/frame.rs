use std::collections::BTreeMap;
use std::sync::Arc;

use chain::{AbciEvent, EventAttribute, EventKind, TransactionEvent};
use node_rpc::BlockResponse;
use serde::Deserialize;
use serde_json::Value;

use crate::error::StreamError;

/// One inbound message on a stream connection.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(Box<TransactionEvent>),
    /// Empty result acknowledging a subscribe/unsubscribe request.
    Ack { id: String },
    Error { id: String, message: String },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Option<RawResult>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct RawResult {
    #[serde(default)]
    data: Option<RawData>,
    /// Composite event keys (`tx.hash`, `message.sender`, ...) to values.
    #[serde(default)]
    events: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct RawData {
    #[serde(rename = "type")]
    kind: String,
    value: Value,
}

#[derive(Deserialize)]
struct TxValue {
    #[serde(rename = "TxResult")]
    tx_result: TxResult,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(with = "serde_str::dec_u64")]
    height: u64,
    #[serde(default)]
    result: TxExecResult,
}

#[derive(Deserialize, Default)]
struct TxExecResult {
    #[serde(default)]
    events: Vec<AbciEvent>,
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse one text frame from `network`'s stream.
pub fn parse_frame(network: &str, text: &str) -> Result<Frame, StreamError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| StreamError::Malformed(e.to_string()))?;
    let id = id_string(&raw.id);

    if let Some(err) = raw.error {
        let message = match err.data {
            Some(data) if !data.is_empty() => format!("{}: {}", err.message, data),
            _ => err.message,
        };
        return Ok(Frame::Error { id, message });
    }

    let result = raw
        .result
        .ok_or_else(|| StreamError::Malformed("frame has neither result nor error".into()))?;
    let Some(data) = result.data else {
        return Ok(Frame::Ack { id });
    };

    let kind = EventKind::from_type(&data.kind);
    let event = match kind {
        EventKind::NewBlock => {
            let resp: BlockResponse = serde_json::from_value(data.value)
                .map_err(|e| StreamError::Malformed(format!("NewBlock value: {e}")))?;
            let block = resp.to_block();
            TransactionEvent {
                network: network.to_string(),
                subscription_id: id,
                kind,
                height: block.height,
                hash: Some(block.hash.clone()),
                events: resp.events(),
                signer_address: None,
                timestamp: Some(block.time),
                block: Some(Arc::new(block)),
            }
        }
        EventKind::Tx => {
            let value: TxValue = serde_json::from_value(data.value)
                .map_err(|e| StreamError::Malformed(format!("Tx value: {e}")))?;
            let mut events = value.tx_result.result.events;
            if events.is_empty() {
                events = events_from_composite_keys(&result.events);
            }
            TransactionEvent {
                network: network.to_string(),
                subscription_id: id,
                kind,
                height: value.tx_result.height,
                hash: first(&result.events, "tx.hash"),
                events,
                signer_address: first(&result.events, "message.sender"),
                timestamp: None,
                block: None,
            }
        }
        EventKind::Other(ref ty) => {
            return Err(StreamError::Malformed(format!("unsupported event type {ty}")))
        }
    };
    Ok(Frame::Event(Box::new(event)))
}

fn first(events: &BTreeMap<String, Vec<String>>, key: &str) -> Option<String> {
    events.get(key).and_then(|v| v.first()).cloned()
}

/// Rebuild events from `type.attribute -> [values]` keys. Used when the node
/// omits the structured event list.
fn events_from_composite_keys(map: &BTreeMap<String, Vec<String>>) -> Vec<AbciEvent> {
    let mut by_type: BTreeMap<&str, Vec<EventAttribute>> = BTreeMap::new();
    for (key, values) in map {
        let Some((ty, attr)) = key.rsplit_once('.') else {
            continue;
        };
        if ty == "tm" || ty == "tx" {
            continue;
        }
        let attrs = by_type.entry(ty).or_default();
        for v in values {
            attrs.push(EventAttribute {
                key: attr.to_string(),
                value: v.clone(),
            });
        }
    }
    by_type
        .into_iter()
        .map(|(ty, attributes)| AbciEvent {
            kind: ty.to_string(),
            attributes,
        })
        .collect()
}
