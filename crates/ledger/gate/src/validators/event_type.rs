use std::sync::Arc;

use async_trait::async_trait;
use ledger_types::EventTypeRegistry;

use super::{ValidationStage, WriteValidator};
use crate::error::WriteTimeValidationError;
use crate::pipeline::ValidationContext;

pub struct EventTypeValidator {
    registry: Arc<EventTypeRegistry>,
}

impl EventTypeValidator {
    pub fn new(registry: Arc<EventTypeRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WriteValidator for EventTypeValidator {
    fn stage(&self) -> ValidationStage {
        ValidationStage::EventType
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), WriteTimeValidationError> {
        let event_type = &ctx.proposal.event_type;
        match self.registry.get(event_type) {
            None => Err(WriteTimeValidationError::UnknownEventType {
                event_type: event_type.clone(),
            }),
            Some(spec) if spec.reserved && !ctx.internal => {
                Err(WriteTimeValidationError::ReservedEventType {
                    event_type: event_type.clone(),
                })
            }
            Some(_) => Ok(()),
        }
    }
}
