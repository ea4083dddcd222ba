use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a validator took part in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockIdFlag {
    Unknown,
    Absent,
    Commit,
    Nil,
}

impl BlockIdFlag {
    /// Numeric form used by the `/block` RPC.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => BlockIdFlag::Absent,
            2 => BlockIdFlag::Commit,
            3 => BlockIdFlag::Nil,
            _ => BlockIdFlag::Unknown,
        }
    }

    /// Enum-name form used in vote extensions (`BLOCK_ID_FLAG_COMMIT`).
    pub fn from_name(name: &str) -> Self {
        match name.trim_start_matches("BLOCK_ID_FLAG_") {
            "ABSENT" => BlockIdFlag::Absent,
            "COMMIT" => BlockIdFlag::Commit,
            "NIL" => BlockIdFlag::Nil,
            _ => BlockIdFlag::Unknown,
        }
    }

    pub fn is_commit(self) -> bool {
        matches!(self, BlockIdFlag::Commit)
    }
}

/// One validator's entry in a block commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSig {
    /// Upper-case hex consensus address. Empty for absent validators.
    pub validator_address: String,
    pub flag: BlockIdFlag,
    pub timestamp: Option<DateTime<Utc>>,
    pub signature: Option<Vec<u8>>,
}

/// The commit for `height`, carried as `last_commit` by block `height + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub height: u64,
    pub round: u32,
    pub signatures: Vec<CommitSig>,
}

impl Commit {
    /// Addresses that signed for the committed block.
    pub fn signers(&self) -> BTreeSet<String> {
        self.signatures
            .iter()
            .filter(|s| s.flag.is_commit() && !s.validator_address.is_empty())
            .map(|s| s.validator_address.clone())
            .collect()
    }

    /// Every address named in the commit, signed or not.
    pub fn participants(&self) -> BTreeSet<String> {
        self.signatures
            .iter()
            .filter(|s| !s.validator_address.is_empty())
            .map(|s| s.validator_address.clone())
            .collect()
    }
}

/// A block as fetched from the node or carried by a `NewBlock` stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub chain_id: String,
    pub time: DateTime<Utc>,
    /// Raw transaction bytes, undecoded.
    pub txs: Vec<Vec<u8>>,
    pub last_commit: Option<Commit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// An ABCI event emitted while executing a block or transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Kind of stream event, taken from `result.data.type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewBlock,
    Tx,
    Other(String),
}

impl EventKind {
    pub fn from_type(ty: &str) -> Self {
        match ty {
            "tendermint/event/NewBlock" => EventKind::NewBlock,
            "tendermint/event/Tx" => EventKind::Tx,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// The unit handed to message processors. Built per inbound frame and never
/// stored as-is.
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub network: String,
    pub subscription_id: String,
    pub kind: EventKind,
    pub height: u64,
    /// Tx hash for `Tx` events, block hash for `NewBlock` events.
    pub hash: Option<String>,
    pub events: Vec<AbciEvent>,
    pub signer_address: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Present for `NewBlock` events.
    pub block: Option<Arc<Block>>,
}

impl TransactionEvent {
    pub fn events_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a AbciEvent> + 'a {
        self.events.iter().filter(move |e| e.kind == ty)
    }

    pub fn has_event_prefix(&self, prefix: &str) -> bool {
        self.events.iter().any(|e| e.kind.starts_with(prefix))
    }
}

/// Per-network ingestion state. Owned by the height tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStreamState {
    /// `None` until the first height is loaded or observed.
    pub last_processed_height: Option<u64>,
    pub connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
}

impl NetworkStreamState {
    /// Missing heights between the last processed height and `height`,
    /// as an inclusive range.
    pub fn gap_before(&self, height: u64) -> Option<(u64, u64)> {
        let last = self.last_processed_height?;
        if height > last.saturating_add(1) {
            Some((last + 1, height - 1))
        } else {
            None
        }
    }

    /// Move forward to `height`. Never moves backwards.
    pub fn advance(&mut self, height: u64) -> bool {
        match self.last_processed_height {
            Some(last) if height <= last => false,
            _ => {
                self.last_processed_height = Some(height);
                true
            }
        }
    }

    pub fn mark_connected(&mut self, at: DateTime<Utc>) {
        self.connected = true;
        self.last_connected_at = Some(at);
    }

    pub fn mark_disconnected(&mut self, at: DateTime<Utc>) {
        self.connected = false;
        self.last_disconnected_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(addr: &str, flag: BlockIdFlag) -> CommitSig {
        CommitSig {
            validator_address: addr.to_string(),
            flag,
            timestamp: None,
            signature: None,
        }
    }

    #[test]
    fn block_id_flag_forms() {
        assert_eq!(BlockIdFlag::from_code(2), BlockIdFlag::Commit);
        assert_eq!(BlockIdFlag::from_code(1), BlockIdFlag::Absent);
        assert_eq!(BlockIdFlag::from_name("BLOCK_ID_FLAG_COMMIT"), BlockIdFlag::Commit);
        assert_eq!(BlockIdFlag::from_name("BLOCK_ID_FLAG_NIL"), BlockIdFlag::Nil);
        assert_eq!(BlockIdFlag::from_name("garbage"), BlockIdFlag::Unknown);
    }

    #[test]
    fn commit_signers_skip_absent() {
        let commit = Commit {
            height: 10,
            round: 0,
            signatures: vec![
                sig("AA", BlockIdFlag::Commit),
                sig("BB", BlockIdFlag::Nil),
                sig("", BlockIdFlag::Absent),
            ],
        };
        let signers = commit.signers();
        assert_eq!(signers.len(), 1);
        assert!(signers.contains("AA"));
        assert_eq!(commit.participants().len(), 2);
    }

    #[test]
    fn gap_detection() {
        let mut s = NetworkStreamState::default();
        assert_eq!(s.gap_before(50), None);
        s.advance(100);
        assert_eq!(s.gap_before(101), None);
        assert_eq!(s.gap_before(100), None);
        assert_eq!(s.gap_before(103), Some((101, 102)));
    }

    #[test]
    fn advance_is_monotonic() {
        let mut s = NetworkStreamState::default();
        assert!(s.advance(5));
        assert!(!s.advance(3));
        assert!(!s.advance(5));
        assert!(s.advance(6));
        assert_eq!(s.last_processed_height, Some(6));
    }

    #[test]
    fn event_kind_from_type() {
        assert_eq!(EventKind::from_type("tendermint/event/NewBlock"), EventKind::NewBlock);
        assert_eq!(EventKind::from_type("tendermint/event/Tx"), EventKind::Tx);
        assert_eq!(
            EventKind::from_type("tendermint/event/Vote"),
            EventKind::Other("tendermint/event/Vote".into())
        );
    }

    #[test]
    fn abci_event_attribute_lookup() {
        let json = r#"{"type":"message","attributes":[{"key":"sender","value":"bbn1xyz"}]}"#;
        let ev: AbciEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.attribute("sender"), Some("bbn1xyz"));
        assert_eq!(ev.attribute("module"), None);
    }
}
