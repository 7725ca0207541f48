use ledger_store::StoreError;
use thiserror::Error;

pub type IntegrityResult<T> = Result<T, IntegrityError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("event store error: {0}")]
    Store(#[from] StoreError),

    #[error("scan cancelled before completion")]
    ScanCancelled,

    #[error("invalid scan request: {0}")]
    InvalidScan(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
