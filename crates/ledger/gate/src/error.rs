use ledger_types::SystemHalted;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Stable discriminant for write-time rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    SystemHalted,
    UnknownEventType,
    ReservedEventType,
    UnknownActor,
    ContentHashMismatch,
    HashChainBreak,
    MissingAggregateId,
    InvalidStateTransition,
    ProjectionUnavailable,
}

/// Why a proposed event was refused before any write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteTimeValidationError {
    #[error(transparent)]
    Halted(#[from] SystemHalted),

    #[error("unknown event type: {event_type}")]
    UnknownEventType { event_type: String },

    #[error("event type {event_type} is reserved for the ledger")]
    ReservedEventType { event_type: String },

    #[error("unknown actor: {actor_id}")]
    UnknownActor { actor_id: String },

    #[error("content hash mismatch: expected {expected}, got {actual}")]
    ContentHashMismatch { expected: String, actual: String },

    #[error("hash chain break: expected prev_hash {expected}, got {actual}")]
    HashChainBreak { expected: String, actual: String },

    #[error("event type {event_type} requires a string aggregate_id in its payload")]
    MissingAggregateId { event_type: String },

    #[error(
        "illegal {aggregate_type} transition for {aggregate_id}: {} -> {attempted_state} (allowed: {})",
        .current_state.as_deref().unwrap_or("<none>"),
        .allowed.join(", ")
    )]
    InvalidStateTransition {
        aggregate_type: String,
        aggregate_id: String,
        current_state: Option<String>,
        attempted_state: String,
        allowed: Vec<String>,
    },

    #[error("{projection} projection unavailable: {reason}")]
    ProjectionUnavailable { projection: String, reason: String },
}

impl WriteTimeValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::Halted(_) => ValidationErrorKind::SystemHalted,
            Self::UnknownEventType { .. } => ValidationErrorKind::UnknownEventType,
            Self::ReservedEventType { .. } => ValidationErrorKind::ReservedEventType,
            Self::UnknownActor { .. } => ValidationErrorKind::UnknownActor,
            Self::ContentHashMismatch { .. } => ValidationErrorKind::ContentHashMismatch,
            Self::HashChainBreak { .. } => ValidationErrorKind::HashChainBreak,
            Self::MissingAggregateId { .. } => ValidationErrorKind::MissingAggregateId,
            Self::InvalidStateTransition { .. } => ValidationErrorKind::InvalidStateTransition,
            Self::ProjectionUnavailable { .. } => ValidationErrorKind::ProjectionUnavailable,
        }
    }

    /// Machine-readable details of the rejection.
    pub fn context(&self) -> Value {
        match self {
            Self::Halted(halted) => json!({
                "reason": halted.reason,
                "triggered_at": halted.triggered_at,
            }),
            Self::UnknownEventType { event_type } | Self::ReservedEventType { event_type } => {
                json!({ "event_type": event_type })
            }
            Self::UnknownActor { actor_id } => json!({ "actor_id": actor_id }),
            Self::ContentHashMismatch { expected, actual }
            | Self::HashChainBreak { expected, actual } => json!({
                "expected": expected,
                "actual": actual,
            }),
            Self::MissingAggregateId { event_type } => json!({ "event_type": event_type }),
            Self::InvalidStateTransition {
                aggregate_type,
                aggregate_id,
                current_state,
                attempted_state,
                allowed,
            } => json!({
                "aggregate_type": aggregate_type,
                "aggregate_id": aggregate_id,
                "current_state": current_state,
                "attempted_state": attempted_state,
                "allowed": allowed,
            }),
            Self::ProjectionUnavailable { projection, reason } => json!({
                "projection": projection,
                "reason": reason,
            }),
        }
    }
}

/// Rejected pipeline assembly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineConfigError {
    #[error("validator {name} is out of order: stage {stage} follows stage {previous}")]
    OutOfOrder {
        name: String,
        stage: u8,
        previous: u8,
    },

    #[error("pipeline is missing the {0} stage")]
    MissingStage(String),
}
