use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use chain::Block;

use crate::error::{classify_height_error, NodeRpcError};
use crate::types::{
    BlockResponse, RawCheckpointResponse, RawCheckpointWithMeta, StakingValidator, StatusResponse,
    TxsByBlockResponse, ValidatorsResponse,
};

/// HTTP timeout for node requests.
pub const NODE_HTTP_TIMEOUT_SECS: u64 = 10;

/// Page size used when listing validators.
const VALIDATORS_PAGE_LIMIT: u32 = 200;

/// Client for one node: CometBFT JSON-RPC plus the Cosmos REST gateway.
pub struct NodeClient {
    rpc_url: String,
    rest_url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl NodeClient {
    pub fn new(rpc_url: &str, rest_url: &str) -> Result<Self, NodeRpcError> {
        Self::with_timeout(rpc_url, rest_url, Duration::from_secs(NODE_HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        rpc_url: &str,
        rest_url: &str,
        timeout: Duration,
    ) -> Result<Self, NodeRpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    /// Send a JSON-RPC request and return its `result`. `height` is the
    /// height the call asks for, used to type height errors.
    async fn rpc_call(
        &self,
        method: &str,
        params: Value,
        height: Option<u64>,
    ) -> Result<Value, NodeRpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });

        debug!(method, id, "sending node RPC request");

        // CometBFT answers errors with HTTP 500 and a JSON-RPC error body,
        // so the body is inspected before the status.
        let resp = self.http.post(&self.rpc_url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) if status.is_success() => return Err(NodeRpcError::Json(e)),
            Err(_) => {
                return Err(NodeRpcError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
        };

        if let Some(err) = value.get("error") {
            let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            let data = err.get("data").and_then(|d| d.as_str()).unwrap_or_default();
            if let Some(typed) = classify_height_error(data, height)
                .or_else(|| classify_height_error(&message, height))
            {
                return Err(typed);
            }
            let message = if data.is_empty() {
                message
            } else {
                format!("{message}: {data}")
            };
            return Err(NodeRpcError::Rpc { code, message });
        }

        match value.get("result") {
            Some(result) if !result.is_null() => Ok(result.clone()),
            _ => Err(NodeRpcError::NullResult),
        }
    }

    /// GET a Cosmos REST path and decode the body.
    async fn rest_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        height: Option<u64>,
    ) -> Result<T, NodeRpcError> {
        let url = format!("{}{}", self.rest_url, path);
        debug!(url = %url, "sending node REST request");

        let resp = self.http.get(&url).query(query).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| text.clone());
            if let Some(typed) = classify_height_error(&message, height) {
                return Err(typed);
            }
            return Err(NodeRpcError::Status {
                status: status.as_u16(),
                body: message,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get_status(&self) -> Result<StatusResponse, NodeRpcError> {
        let result = self.rpc_call("status", json!({}), None).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Latest committed height.
    pub async fn get_current_height(&self) -> Result<u64, NodeRpcError> {
        Ok(self.get_status().await?.sync_info.latest_block_height)
    }

    pub async fn get_block_response(&self, height: u64) -> Result<BlockResponse, NodeRpcError> {
        let result = self
            .rpc_call("block", json!({ "height": height.to_string() }), Some(height))
            .await?;
        let resp: BlockResponse = serde_json::from_value(result)?;
        Ok(resp)
    }

    pub async fn get_block_by_height(&self, height: u64) -> Result<Block, NodeRpcError> {
        Ok(self.get_block_response(height).await?.to_block())
    }

    /// Fetch a block by its hex hash.
    pub async fn get_block_by_hash(&self, hash: &str) -> Result<Block, NodeRpcError> {
        let bytes = hex::decode(hash.trim_start_matches("0x"))
            .map_err(|e| NodeRpcError::Malformed(format!("bad block hash {hash}: {e}")))?;
        let result = self
            .rpc_call("block_by_hash", json!({ "hash": STANDARD.encode(bytes) }), None)
            .await?;
        if result.get("block").map_or(true, Value::is_null) {
            return Err(NodeRpcError::NullResult);
        }
        let resp: BlockResponse = serde_json::from_value(result)?;
        Ok(resp.to_block())
    }

    /// Decoded transaction messages of the block at `height`, in order.
    pub async fn get_block_messages(&self, height: u64) -> Result<Vec<Value>, NodeRpcError> {
        let resp: TxsByBlockResponse = self
            .rest_get(
                &format!("/cosmos/tx/v1beta1/txs/block/{height}"),
                &[],
                Some(height),
            )
            .await?;
        Ok(resp.into_messages())
    }

    pub async fn get_raw_checkpoint(
        &self,
        epoch: u64,
    ) -> Result<RawCheckpointWithMeta, NodeRpcError> {
        let resp: RawCheckpointResponse = self
            .rest_get(
                &format!("/babylon/checkpointing/v1/raw_checkpoint/{epoch}"),
                &[],
                None,
            )
            .await?;
        Ok(resp.raw_checkpoint)
    }

    /// Every validator known to the staking module, following pagination.
    pub async fn get_validators(&self) -> Result<Vec<StakingValidator>, NodeRpcError> {
        let mut all = Vec::new();
        let mut next_key: Option<String> = None;
        loop {
            let mut query = vec![("pagination.limit", VALIDATORS_PAGE_LIMIT.to_string())];
            if let Some(key) = &next_key {
                query.push(("pagination.key", key.clone()));
            }
            let page: ValidatorsResponse = self
                .rest_get("/cosmos/staking/v1beta1/validators", &query, None)
                .await?;
            all.extend(page.validators);
            next_key = page
                .pagination
                .and_then(|p| p.next_key)
                .filter(|k| !k.is_empty());
            if next_key.is_none() {
                break;
            }
        }
        debug!(count = all.len(), "fetched validator set");
        Ok(all)
    }
}
