mod actor;
mod event_type;
mod hash_chain;
mod state_transition;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::WriteTimeValidationError;
use crate::pipeline::ValidationContext;
use crate::projection::ProjectionError;

pub use actor::ActorValidator;
pub use event_type::EventTypeValidator;
pub use hash_chain::HashChainValidator;
pub use state_transition::StateTransitionValidator;

/// Position of a validator in the pipeline. Declaration order is run order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationStage {
    EventType = 1,
    Actor = 2,
    HashChain = 3,
    StateTransition = 4,
}

impl ValidationStage {
    pub const ALL: [ValidationStage; 4] = [
        ValidationStage::EventType,
        ValidationStage::Actor,
        ValidationStage::HashChain,
        ValidationStage::StateTransition,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ValidationStage::EventType => "event-type",
            ValidationStage::Actor => "actor",
            ValidationStage::HashChain => "hash-chain",
            ValidationStage::StateTransition => "state-transition",
        }
    }
}

/// One structural check over a proposed event.
#[async_trait]
pub trait WriteValidator: Send + Sync {
    fn stage(&self) -> ValidationStage;

    /// Soft time limit; exceeding it is logged, not rejected.
    fn budget(&self) -> Option<Duration> {
        None
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), WriteTimeValidationError>;
}

/// Await a projection read under `timeout`; errors and timeouts both reject.
pub(crate) async fn read_projection<T, F>(
    projection: &str,
    timeout: Duration,
    read: F,
) -> Result<T, WriteTimeValidationError>
where
    F: Future<Output = Result<T, ProjectionError>>,
{
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(WriteTimeValidationError::ProjectionUnavailable {
            projection: projection.to_owned(),
            reason: err.0,
        }),
        Err(_) => Err(WriteTimeValidationError::ProjectionUnavailable {
            projection: projection.to_owned(),
            reason: format!("no response within {}ms", timeout.as_millis()),
        }),
    }
}
