use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{read_projection, ValidationStage, WriteValidator};
use crate::error::WriteTimeValidationError;
use crate::pipeline::ValidationContext;
use crate::projection::ActorProjection;

pub struct ActorValidator {
    actors: Arc<dyn ActorProjection>,
    timeout: Duration,
}

impl ActorValidator {
    pub fn new(actors: Arc<dyn ActorProjection>, timeout: Duration) -> Self {
        Self { actors, timeout }
    }
}

#[async_trait]
impl WriteValidator for ActorValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::Actor
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), WriteTimeValidationError> {
        let actor_id = &ctx.proposal.actor_id;
        let exists = read_projection(
            "actor",
            self.timeout,
            self.actors.actor_exists(actor_id),
        )
        .await?;

        if exists {
            Ok(())
        } else {
            Err(WriteTimeValidationError::UnknownActor {
                actor_id: actor_id.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::mocks::MockActorProjection;
    use ledger_types::{ProposedEvent, GENESIS_PREV_HASH};
    use serde_json::json;

    fn proposal(actor: &str) -> ProposedEvent {
        ProposedEvent::new("vote.cast", actor, json!({}), GENESIS_PREV_HASH)
    }

    #[tokio::test]
    async fn known_actor_passes() {
        let actors = Arc::new(MockActorProjection::with_actors(["archon-1"]));
        let validator = ActorValidator::new(actors.clone(), Duration::from_millis(100));
        let p = proposal("archon-1");
        validator.validate(&ValidationContext::new(&p, None)).await.unwrap();
        assert_eq!(actors.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected() {
        let actors = Arc::new(MockActorProjection::with_actors(["archon-1"]));
        let validator = ActorValidator::new(actors, Duration::from_millis(100));
        let p = proposal("impostor");
        let err = validator
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ValidationErrorKind::UnknownActor);
    }

    #[tokio::test]
    async fn slow_projection_fails_closed() {
        let actors = Arc::new(
            MockActorProjection::with_actors(["archon-1"]).with_delay(Duration::from_millis(200)),
        );
        let validator = ActorValidator::new(actors, Duration::from_millis(10));
        let p = proposal("archon-1");
        let err = validator
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ValidationErrorKind::ProjectionUnavailable);
    }

    #[tokio::test]
    async fn failing_projection_fails_closed() {
        let actors = Arc::new(MockActorProjection::unavailable("replica lagging"));
        let validator = ActorValidator::new(actors, Duration::from_millis(100));
        let p = proposal("archon-1");
        let err = validator
            .validate(&ValidationContext::new(&p, None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WriteTimeValidationError::ProjectionUnavailable {
                projection: "actor".into(),
                reason: "replica lagging".into()
            }
        );
    }
}
