pub mod checkpoint;
pub mod signatures;
pub mod types;

pub use checkpoint::{
    CheckpointPayload, CheckpointRecord, CheckpointStatus, CheckpointUpdate, LifecycleEntry,
    ParticipationStats, Transition, ValidatorVoteRecord,
};
pub use signatures::{SignatureEntry, ValidatorSignatureRecord};
pub use types::{
    AbciEvent, Block, BlockIdFlag, Commit, CommitSig, EventAttribute, EventKind,
    NetworkStreamState, TransactionEvent,
};
