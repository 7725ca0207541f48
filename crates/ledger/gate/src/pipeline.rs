use std::sync::Arc;
use std::time::Instant;

use ledger_store::ChainHead;
use ledger_types::{EventTypeRegistry, HaltState, ProposedEvent};
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::{PipelineConfigError, WriteTimeValidationError};
use crate::projection::{ActorProjection, StateProjection};
use crate::transitions::TransitionTable;
use crate::validators::{
    ActorValidator, EventTypeValidator, HashChainValidator, StateTransitionValidator,
    ValidationStage, WriteValidator,
};

/// What a validator sees: the proposal and the chain head it must link to.
#[derive(Clone, Copy, Debug)]
pub struct ValidationContext<'a> {
    pub proposal: &'a ProposedEvent,
    pub head: Option<&'a ChainHead>,
    /// Set when the ledger itself is the writer; reserved types are allowed.
    pub internal: bool,
}

impl<'a> ValidationContext<'a> {
    pub fn new(proposal: &'a ProposedEvent, head: Option<&'a ChainHead>) -> Self {
        Self {
            proposal,
            head,
            internal: false,
        }
    }

    pub fn internal(proposal: &'a ProposedEvent, head: Option<&'a ChainHead>) -> Self {
        Self {
            internal: true,
            ..Self::new(proposal, head)
        }
    }
}

/// Ordered, fail-fast validator chain.
pub struct ValidationPipeline {
    validators: Vec<Box<dyn WriteValidator>>,
    halt: Arc<HaltState>,
}

impl ValidationPipeline {
    /// The four standard validators in canonical order.
    pub fn standard(
        registry: Arc<EventTypeRegistry>,
        table: Arc<TransitionTable>,
        actors: Arc<dyn ActorProjection>,
        states: Arc<dyn StateProjection>,
        halt: Arc<HaltState>,
        config: &GateConfig,
    ) -> Self {
        Self {
            validators: vec![
                Box::new(EventTypeValidator::new(registry.clone())),
                Box::new(ActorValidator::new(actors, config.projection_timeout)),
                Box::new(HashChainValidator::new(config.hash_chain_budget)),
                Box::new(StateTransitionValidator::new(
                    registry,
                    table,
                    states,
                    config.projection_timeout,
                    config.state_transition_budget,
                )),
            ],
            halt,
        }
    }

    /// Assemble a custom chain. Each canonical stage must appear exactly
    /// once, in canonical order.
    pub fn with_validators(
        validators: Vec<Box<dyn WriteValidator>>,
        halt: Arc<HaltState>,
    ) -> Result<Self, PipelineConfigError> {
        let mut previous: Option<ValidationStage> = None;
        for validator in &validators {
            let stage = validator.stage();
            if let Some(prev) = previous {
                if stage <= prev {
                    return Err(PipelineConfigError::OutOfOrder {
                        name: stage.name().to_owned(),
                        stage: stage.number(),
                        previous: prev.number(),
                    });
                }
            }
            previous = Some(stage);
        }
        for required in ValidationStage::ALL {
            if !validators.iter().any(|v| v.stage() == required) {
                return Err(PipelineConfigError::MissingStage(required.name().to_owned()));
            }
        }
        Ok(Self { validators, halt })
    }

    pub fn stages(&self) -> Vec<ValidationStage> {
        self.validators.iter().map(|v| v.stage()).collect()
    }

    /// Run every validator against `proposal` as it would be appended after
    /// `head`. The first rejection is returned.
    pub async fn validate(
        &self,
        proposal: &ProposedEvent,
        head: Option<&ChainHead>,
    ) -> Result<(), WriteTimeValidationError> {
        self.run(ValidationContext::new(proposal, head)).await
    }

    /// Same checks for an event the ledger writes on its own behalf.
    pub async fn validate_internal(
        &self,
        proposal: &ProposedEvent,
        head: Option<&ChainHead>,
    ) -> Result<(), WriteTimeValidationError> {
        self.run(ValidationContext::internal(proposal, head)).await
    }

    async fn run(&self, ctx: ValidationContext<'_>) -> Result<(), WriteTimeValidationError> {
        self.halt.check()?;

        let proposal = ctx.proposal;
        for validator in &self.validators {
            let stage = validator.stage();
            let started = Instant::now();
            let result = validator.validate(&ctx).await;
            let elapsed = started.elapsed();

            if let Some(budget) = validator.budget() {
                if elapsed > budget {
                    warn!(
                        stage = stage.name(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        budget_ms = budget.as_millis() as u64,
                        "Validator exceeded its time budget"
                    );
                }
            }

            if let Err(err) = result {
                info!(
                    stage = stage.name(),
                    event_type = %proposal.event_type,
                    actor_id = %proposal.actor_id,
                    kind = ?err.kind(),
                    "Proposed event rejected"
                );
                return Err(err);
            }
            debug!(stage = stage.name(), "Validator passed");
        }
        Ok(())
    }
}
