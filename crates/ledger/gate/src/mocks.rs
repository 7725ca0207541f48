//! Counting projections for tests and local wiring.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::projection::{ActorProjection, ProjectionError, StateProjection};

/// Actor projection over a fixed set of ids. Counts every lookup.
#[derive(Default)]
pub struct MockActorProjection {
    actors: RwLock<HashSet<String>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl MockActorProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors<I, S>(actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            actors: RwLock::new(actors.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Every lookup fails with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add(&self, actor_id: impl Into<String>) {
        if let Ok(mut actors) = self.actors.write() {
            actors.insert(actor_id.into());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActorProjection for MockActorProjection {
    async fn actor_exists(&self, actor_id: &str) -> Result<bool, ProjectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(ProjectionError(reason.clone()));
        }
        self.actors
            .read()
            .map(|actors| actors.contains(actor_id))
            .map_err(|_| ProjectionError("mock actor projection poisoned".into()))
    }
}

/// State projection backed by a map. Counts every lookup.
#[derive(Default)]
pub struct MockStateProjection {
    states: RwLock<HashMap<(String, String), String>>,
    calls: AtomicUsize,
}

impl MockStateProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, aggregate_type: &str, aggregate_id: &str, state: &str) {
        if let Ok(mut states) = self.states.write() {
            states.insert(
                (aggregate_type.to_owned(), aggregate_id.to_owned()),
                state.to_owned(),
            );
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateProjection for MockStateProjection {
    async fn current_state(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<String>, ProjectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.states
            .read()
            .map(|states| {
                states
                    .get(&(aggregate_type.to_owned(), aggregate_id.to_owned()))
                    .cloned()
            })
            .map_err(|_| ProjectionError("mock state projection poisoned".into()))
    }
}
