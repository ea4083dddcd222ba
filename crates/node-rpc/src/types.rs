use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use serde_str::{b64_as_hex, b64_bytes, b64_bytes_list, b64_bytes_opt, dec_u64, dec_u64_opt, hex_upper};
use sha2::{Digest, Sha256};

use chain::{
    AbciEvent, Block, BlockIdFlag, CheckpointPayload, CheckpointStatus, Commit, CommitSig,
    LifecycleEntry,
};

/// `@type` of the message the proposer injects into the first block of
/// each epoch.
pub const MSG_INJECTED_CHECKPOINT: &str = "/babylon.checkpointing.v1.MsgInjectedCheckpoint";

// ============================================================================
// CometBFT RPC
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlockId {
    #[serde(default, with = "hex_upper")]
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcHeader {
    pub chain_id: String,
    #[serde(with = "dec_u64")]
    pub height: u64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcBlockData {
    #[serde(default, with = "b64_bytes_list")]
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCommitSig {
    #[serde(with = "dec_u64")]
    pub block_id_flag: u64,
    #[serde(default, with = "hex_upper")]
    pub validator_address: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, with = "b64_bytes_opt")]
    pub signature: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCommit {
    #[serde(with = "dec_u64")]
    pub height: u64,
    #[serde(default, with = "dec_u64")]
    pub round: u64,
    #[serde(default)]
    pub signatures: Vec<RpcCommitSig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub header: RpcHeader,
    #[serde(default)]
    pub data: RpcBlockData,
    #[serde(default)]
    pub last_commit: Option<RpcCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeBlockResult {
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

/// Result of `/block` and `/block_by_hash`, and the `value` of a `NewBlock`
/// stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockResponse {
    pub block_id: RpcBlockId,
    pub block: RpcBlock,
    #[serde(default)]
    pub result_finalize_block: Option<FinalizeBlockResult>,
}

impl BlockResponse {
    pub fn to_block(&self) -> Block {
        let last_commit = self.block.last_commit.as_ref().map(|c| Commit {
            height: c.height,
            round: c.round as u32,
            signatures: c
                .signatures
                .iter()
                .map(|s| CommitSig {
                    validator_address: s.validator_address.clone(),
                    flag: BlockIdFlag::from_code(s.block_id_flag),
                    timestamp: s.timestamp,
                    signature: s.signature.clone(),
                })
                .collect(),
        });
        Block {
            height: self.block.header.height,
            hash: self.block_id.hash.clone(),
            chain_id: self.block.header.chain_id.clone(),
            time: self.block.header.time,
            txs: self.block.data.txs.clone(),
            last_commit,
        }
    }

    /// Block-level events, if the node attached them.
    pub fn events(&self) -> Vec<AbciEvent> {
        self.result_finalize_block
            .as_ref()
            .map(|r| r.events.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    #[serde(with = "dec_u64")]
    pub latest_block_height: u64,
    #[serde(default)]
    pub latest_block_time: Option<DateTime<Utc>>,
    #[serde(default, with = "dec_u64_opt")]
    pub earliest_block_height: Option<u64>,
    #[serde(default)]
    pub catching_up: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub network: String,
}

/// Result of `/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub node_info: Option<NodeInfo>,
    pub sync_info: SyncInfo,
}

// ============================================================================
// Cosmos REST: transactions of a block
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxBody {
    #[serde(default)]
    pub messages: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestTx {
    #[serde(default)]
    pub body: TxBody,
}

/// Response of `/cosmos/tx/v1beta1/txs/block/{height}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxsByBlockResponse {
    #[serde(default)]
    pub txs: Option<Vec<RestTx>>,
}

impl TxsByBlockResponse {
    /// All messages of the block, in transaction order.
    pub fn into_messages(self) -> Vec<Value> {
        self.txs
            .unwrap_or_default()
            .into_iter()
            .flat_map(|tx| tx.body.messages)
            .collect()
    }
}

pub fn message_type(msg: &Value) -> Option<&str> {
    msg.get("@type").and_then(Value::as_str)
}

// ============================================================================
// Checkpoints
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCheckpoint {
    #[serde(default, with = "dec_u64_opt")]
    pub epoch_num: Option<u64>,
    #[serde(default, with = "b64_bytes")]
    pub block_hash: Vec<u8>,
    /// The query endpoint renders the hash as hex instead.
    #[serde(default)]
    pub block_hash_hex: Option<String>,
    #[serde(default, with = "b64_bytes")]
    pub bitmap: Vec<u8>,
    #[serde(default, with = "b64_bytes")]
    pub bls_multi_sig: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLifecycleEntry {
    pub state: String,
    #[serde(default, with = "dec_u64")]
    pub block_height: u64,
    #[serde(default)]
    pub block_time: Option<DateTime<Utc>>,
}

/// `RawCheckpointWithMeta` as embedded in the injected message and as
/// returned by `/babylon/checkpointing/v1/raw_checkpoint/{epoch}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCheckpointWithMeta {
    pub ckpt: RawCheckpoint,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, with = "b64_bytes")]
    pub bls_aggr_pk: Vec<u8>,
    #[serde(default, with = "dec_u64")]
    pub power_sum: u64,
    #[serde(default)]
    pub lifecycle: Vec<RawLifecycleEntry>,
}

impl RawCheckpointWithMeta {
    pub fn status(&self) -> Option<CheckpointStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn payload(&self) -> CheckpointPayload {
        let block_hash = match &self.ckpt.block_hash_hex {
            Some(h) if self.ckpt.block_hash.is_empty() => hex::decode(h).unwrap_or_default(),
            _ => self.ckpt.block_hash.clone(),
        };
        CheckpointPayload {
            block_hash,
            bitmap: self.ckpt.bitmap.clone(),
            bls_multi_sig: self.ckpt.bls_multi_sig.clone(),
            bls_aggregate_public_key: self.bls_aggr_pk.clone(),
            power_sum: self.power_sum,
        }
    }

    /// Lifecycle entries with a recognised state.
    pub fn lifecycle(&self) -> Vec<LifecycleEntry> {
        self.lifecycle
            .iter()
            .filter_map(|e| {
                Some(LifecycleEntry {
                    state: e.state.parse().ok()?,
                    block_height: e.block_height,
                    block_time: e.block_time,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCheckpointResponse {
    pub raw_checkpoint: RawCheckpointWithMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteValidator {
    #[serde(with = "b64_as_hex")]
    pub address: String,
    #[serde(default, with = "dec_u64")]
    pub power: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedVoteInfo {
    pub validator: VoteValidator,
    #[serde(default, with = "b64_bytes_opt")]
    pub vote_extension: Option<Vec<u8>>,
    #[serde(default, with = "b64_bytes_opt")]
    pub extension_signature: Option<Vec<u8>>,
    /// Enum name (`BLOCK_ID_FLAG_COMMIT`) or its numeric code.
    #[serde(default)]
    pub block_id_flag: Value,
}

impl ExtendedVoteInfo {
    pub fn flag(&self) -> BlockIdFlag {
        match &self.block_id_flag {
            Value::String(s) => match s.parse::<u64>() {
                Ok(code) => BlockIdFlag::from_code(code),
                Err(_) => BlockIdFlag::from_name(s),
            },
            Value::Number(n) => n.as_u64().map_or(BlockIdFlag::Unknown, BlockIdFlag::from_code),
            _ => BlockIdFlag::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedCommitInfo {
    #[serde(default, with = "dec_u64")]
    pub round: u64,
    #[serde(default)]
    pub votes: Vec<ExtendedVoteInfo>,
}

/// Body of `MsgInjectedCheckpoint`.
#[derive(Debug, Clone, Deserialize)]
pub struct InjectedCheckpoint {
    pub ckpt: RawCheckpointWithMeta,
    #[serde(default)]
    pub extended_commit_info: Option<ExtendedCommitInfo>,
}

// ============================================================================
// Staking
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusPubkey {
    #[serde(rename = "@type", default)]
    pub type_url: String,
    #[serde(with = "b64_bytes")]
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorDescription {
    #[serde(default)]
    pub moniker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StakingValidator {
    pub operator_address: String,
    pub consensus_pubkey: ConsensusPubkey,
    #[serde(default)]
    pub description: ValidatorDescription,
    #[serde(default)]
    pub jailed: bool,
    #[serde(default)]
    pub status: String,
}

impl StakingValidator {
    /// CometBFT consensus address: first 20 bytes of sha256 of the ed25519
    /// public key, upper-case hex.
    pub fn hex_address(&self) -> String {
        let digest = Sha256::digest(&self.consensus_pubkey.key);
        hex::encode_upper(&digest[..20])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorsResponse {
    #[serde(default)]
    pub validators: Vec<StakingValidator>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}
