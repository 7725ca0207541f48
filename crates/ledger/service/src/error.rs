use ledger_gate::{ProjectionError, WriteTimeValidationError};
use ledger_integrity::IntegrityError;
use ledger_signing::SigningError;
use ledger_store::StoreError;
use ledger_types::{ChainError, SystemHalted};
use ledger_witness::WitnessError;
use thiserror::Error;

pub type LedgerServiceResult<T> = Result<T, LedgerServiceError>;

#[derive(Debug, Error)]
pub enum LedgerServiceError {
    #[error(transparent)]
    Halted(#[from] SystemHalted),

    #[error("validation failed: {0}")]
    Validation(#[from] WriteTimeValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("witness error: {0}")]
    Witness(#[from] WitnessError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("serialization error: {0}")]
    Chain(#[from] ChainError),

    #[error("state projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("no event at sequence {0}")]
    EventNotFound(u64),

    #[error("replay rejected at sequence {sequence}: {reason}")]
    ReplayRejected { sequence: u64, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerServiceError {
    /// True when the failure is the halted condition, from any layer.
    pub fn is_halted(&self) -> bool {
        matches!(
            self,
            Self::Halted(_)
                | Self::Validation(WriteTimeValidationError::Halted(_))
                | Self::Signing(SigningError::Halted(_))
                | Self::Witness(WitnessError::Halted(_))
        )
    }
}
