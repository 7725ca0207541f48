//! Read-only views the validators consult.
//!
//! Projections are eventually consistent read models maintained outside the
//! write path. Validators only ever read them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ledger_types::{Event, EventTypeRegistry};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("projection error: {0}")]
pub struct ProjectionError(pub String);

/// Resolves whether an actor exists.
#[async_trait]
pub trait ActorProjection: Send + Sync {
    async fn actor_exists(&self, actor_id: &str) -> Result<bool, ProjectionError>;
}

/// Current state of an aggregate (petition, motion, ...). `None` means the
/// aggregate has not been created yet.
#[async_trait]
pub trait StateProjection: Send + Sync {
    async fn current_state(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<String>, ProjectionError>;
}

/// Process-local state projection, advanced by the ledger after each
/// accepted append and rebuilt from the stored chain on startup.
#[derive(Default)]
pub struct InMemoryStateProjection {
    states: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryStateProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        state: &str,
    ) -> Result<(), ProjectionError> {
        self.states
            .write()
            .map_err(|_| ProjectionError("state projection lock poisoned".into()))?
            .insert(
                (aggregate_type.to_owned(), aggregate_id.to_owned()),
                state.to_owned(),
            );
        Ok(())
    }

    /// Apply the lifecycle transition `event` performs, if any. Returns
    /// whether an aggregate moved.
    pub fn advance(
        &self,
        registry: &EventTypeRegistry,
        event: &Event,
    ) -> Result<bool, ProjectionError> {
        let Some(transition) = registry
            .get(event.event_type())
            .and_then(|spec| spec.transition.as_ref())
        else {
            return Ok(false);
        };
        let Some(aggregate_id) = event.payload().get("aggregate_id").and_then(Value::as_str) else {
            return Ok(false);
        };
        self.apply(&transition.aggregate_type, aggregate_id, &transition.target_state)?;
        Ok(true)
    }

    /// Number of tracked aggregates.
    pub fn len(&self) -> usize {
        self.states.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateProjection for InMemoryStateProjection {
    async fn current_state(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<String>, ProjectionError> {
        Ok(self
            .states
            .read()
            .map_err(|_| ProjectionError("state projection lock poisoned".into()))?
            .get(&(aggregate_type.to_owned(), aggregate_id.to_owned()))
            .cloned())
    }
}
