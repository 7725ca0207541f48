use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by event store backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("chain head moved: expected {expected:?}, found {actual:?}")]
    HeadMismatch {
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("append out of order: expected sequence {expected}, got {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },

    #[error("append with mismatched prev_hash: expected {expected}, got {actual}")]
    PrevHashMismatch { expected: String, actual: String },

    #[error("duplicate event id: {0}")]
    DuplicateEvent(String),

    #[error("invalid range: from_seq {from} is greater than to_seq {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
