use thiserror::Error;

/// Errors from hash-chain primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
