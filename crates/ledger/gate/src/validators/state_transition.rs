use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledger_types::EventTypeRegistry;
use serde_json::Value;

use super::{read_projection, ValidationStage, WriteValidator};
use crate::error::WriteTimeValidationError;
use crate::pipeline::ValidationContext;
use crate::projection::StateProjection;
use crate::transitions::TransitionTable;

pub struct StateTransitionValidator {
    registry: Arc<EventTypeRegistry>,
    table: Arc<TransitionTable>,
    states: Arc<dyn StateProjection>,
    timeout: Duration,
    budget: Duration,
}

impl StateTransitionValidator {
    pub fn new(
        registry: Arc<EventTypeRegistry>,
        table: Arc<TransitionTable>,
        states: Arc<dyn StateProjection>,
        timeout: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            registry,
            table,
            states,
            timeout,
            budget,
        }
    }
}

#[async_trait]
impl WriteValidator for StateTransitionValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::StateTransition
    }

    fn budget(&self) -> Option<Duration> {
        Some(self.budget)
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), WriteTimeValidationError> {
        let proposal = ctx.proposal;
        let Some(transition) = self
            .registry
            .get(&proposal.event_type)
            .and_then(|spec| spec.transition.as_ref())
        else {
            return Ok(());
        };

        let aggregate_id = proposal
            .payload
            .get("aggregate_id")
            .and_then(Value::as_str)
            .ok_or_else(|| WriteTimeValidationError::MissingAggregateId {
                event_type: proposal.event_type.clone(),
            })?;

        let current = read_projection(
            "state",
            self.timeout,
            self.states
                .current_state(&transition.aggregate_type, aggregate_id),
        )
        .await?;

        let target = transition.target_state.as_str();
        if self
            .table
            .is_allowed(&transition.aggregate_type, current.as_deref(), target)
        {
            return Ok(());
        }

        Err(WriteTimeValidationError::InvalidStateTransition {
            aggregate_type: transition.aggregate_type.clone(),
            aggregate_id: aggregate_id.to_owned(),
            allowed: self
                .table
                .allowed_from(&transition.aggregate_type, current.as_deref()),
            current_state: current,
            attempted_state: target.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::mocks::MockStateProjection;
    use ledger_types::{ProposedEvent, GENESIS_PREV_HASH};
    use serde_json::json;

    fn validator(states: Arc<MockStateProjection>) -> StateTransitionValidator {
        StateTransitionValidator::new(
            Arc::new(EventTypeRegistry::constitutional()),
            Arc::new(TransitionTable::constitutional()),
            states,
            Duration::from_millis(100),
            Duration::from_millis(10),
        )
    }

    fn proposal(event_type: &str, payload: Value) -> ProposedEvent {
        ProposedEvent::new(event_type, "archon-1", payload, GENESIS_PREV_HASH)
    }

    #[tokio::test]
    async fn events_without_transition_skip_projection() {
        let states = Arc::new(MockStateProjection::new());
        let p = proposal("vote.cast", json!({}));
        validator(states.clone())
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap();
        assert_eq!(states.calls(), 0);
    }

    #[tokio::test]
    async fn legal_transition_passes() {
        let states = Arc::new(MockStateProjection::new());
        states.set("petition", "p-1", "submitted");
        let p = proposal("petition.acknowledged", json!({"aggregate_id": "p-1"}));
        validator(states.clone())
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap();
        assert_eq!(states.calls(), 1);
    }

    #[tokio::test]
    async fn illegal_transition_lists_allowed_targets() {
        let states = Arc::new(MockStateProjection::new());
        states.set("petition", "p-1", "submitted");
        let p = proposal("petition.accepted", json!({"aggregate_id": "p-1"}));
        let err = validator(states)
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WriteTimeValidationError::InvalidStateTransition {
                aggregate_type: "petition".into(),
                aggregate_id: "p-1".into(),
                current_state: Some("submitted".into()),
                attempted_state: "accepted".into(),
                allowed: vec!["acknowledged".into(), "withdrawn".into()],
            }
        );
    }

    #[tokio::test]
    async fn missing_aggregate_id_is_rejected() {
        let states = Arc::new(MockStateProjection::new());
        let p = proposal("petition.submitted", json!({"title": "more light"}));
        let err = validator(states)
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ValidationErrorKind::MissingAggregateId);
    }
}
