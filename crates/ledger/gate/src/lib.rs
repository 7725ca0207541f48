//! Write-time validation for the constitutional ledger.
//!
//! Every proposed event passes four structural checks, cheapest first, before
//! it may be signed and stored:
//!
//! 1. event type is registered
//! 2. actor resolves
//! 3. content hash and chain link are correct
//! 4. the aggregate state transition is legal
//!
//! The pipeline fails fast and fails closed: the first rejection stops the
//! run, and a projection that errors or times out rejects the write.

pub mod config;
pub mod error;
pub mod mocks;
pub mod pipeline;
pub mod projection;
pub mod transitions;
pub mod validators;

pub use config::GateConfig;
pub use error::{PipelineConfigError, ValidationErrorKind, WriteTimeValidationError};
pub use pipeline::{ValidationContext, ValidationPipeline};
pub use projection::{ActorProjection, InMemoryStateProjection, ProjectionError, StateProjection};
pub use transitions::TransitionTable;
pub use validators::{
    ActorValidator, EventTypeValidator, HashChainValidator, StateTransitionValidator,
    ValidationStage, WriteValidator,
};
