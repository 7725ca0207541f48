use chrono::{DateTime, Utc};
use ledger_types::SystemHalted;
use thiserror::Error;

pub type SigningResult<T> = Result<T, SigningError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error(transparent)]
    Halted(#[from] SystemHalted),

    #[error("no active key for agent {agent_id}")]
    NoActiveKey { agent_id: String },

    #[error("no key for agent {agent_id} was active at {at}")]
    NoKeyAtInstant { agent_id: String, at: DateTime<Utc> },

    #[error("signing key mismatch: expected {expected}, got {actual}")]
    KeyMismatch { expected: String, actual: String },

    #[error("private key unavailable for key {key_id}")]
    PrivateKeyUnavailable { key_id: String },

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("unsupported signature algorithm version {0}")]
    UnsupportedAlgorithm(u16),

    #[error("key {key_id} cannot be deleted; keys are only rotated")]
    KeyDeletionForbidden { key_id: String },

    #[error("duplicate key id: {0}")]
    DuplicateKey(String),

    #[error("invalid key window: {0}")]
    InvalidKeyWindow(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl SigningError {
    /// True when the error means "this signature is not valid" rather than
    /// "verification could not run".
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            SigningError::NoKeyAtInstant { .. }
                | SigningError::KeyMismatch { .. }
                | SigningError::InvalidKeyMaterial(_)
                | SigningError::SignatureInvalid(_)
                | SigningError::UnsupportedAlgorithm(_)
        )
    }
}
