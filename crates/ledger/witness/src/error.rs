use ledger_types::SystemHalted;
use thiserror::Error;
use uuid::Uuid;

pub type WitnessResult<T> = Result<T, WitnessError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WitnessError {
    #[error(transparent)]
    Halted(#[from] SystemHalted),

    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("insufficient witnesses: need {required}, found {available} without a blocked pair")]
    InsufficientWitnesses { required: usize, available: usize },

    #[error("invalid witness pair key: {0}")]
    InvalidPairKey(String),

    #[error("investigation not found: {0}")]
    InvestigationNotFound(Uuid),

    #[error("investigation {id} already resolved as {status}")]
    AlreadyResolved { id: Uuid, status: String },

    #[error("resolution requires a non-empty {0}")]
    MissingResolution(&'static str),

    #[error("witness pair {0} is permanently banned")]
    PairBanned(String),

    #[error("witness pair {pair_key} already under investigation {investigation_id}")]
    InvestigationAlreadyOpen {
        pair_key: String,
        investigation_id: Uuid,
    },

    #[error("attestation for sequence {0} already recorded")]
    DuplicateAttestation(u64),

    #[error("invalid witness configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
