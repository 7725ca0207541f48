use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{WitnessError, WitnessResult};
use crate::investigation::{Investigation, PairStatus};

/// Durable record of investigations and witness pair status.
#[async_trait]
pub trait InvestigationStore: Send + Sync {
    async fn insert(&self, investigation: &Investigation) -> WitnessResult<()>;

    /// Persist a resolution. Only an active stored investigation may be
    /// replaced.
    async fn record_resolution(&self, investigation: &Investigation) -> WitnessResult<()>;

    async fn get(&self, investigation_id: Uuid) -> WitnessResult<Option<Investigation>>;

    async fn list(&self) -> WitnessResult<Vec<Investigation>>;

    /// `None` reinstates the pair.
    async fn set_pair_status(&self, pair_key: &str, status: Option<PairStatus>)
        -> WitnessResult<()>;

    async fn pair_statuses(&self) -> WitnessResult<HashMap<String, PairStatus>>;
}

#[derive(Default)]
struct StoreState {
    investigations: Vec<Investigation>,
    pair_status: HashMap<String, PairStatus>,
}

#[derive(Default)]
pub struct InMemoryInvestigationStore {
    inner: RwLock<StoreState>,
}

impl InMemoryInvestigationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> WitnessError {
    WitnessError::Backend("investigation store lock poisoned".into())
}

#[async_trait]
impl InvestigationStore for InMemoryInvestigationStore {
    async fn insert(&self, investigation: &Investigation) -> WitnessResult<()> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        if state
            .investigations
            .iter()
            .any(|i| i.investigation_id == investigation.investigation_id)
        {
            return Err(WitnessError::Backend(format!(
                "duplicate investigation {}",
                investigation.investigation_id
            )));
        }
        state.investigations.push(investigation.clone());
        Ok(())
    }

    async fn record_resolution(&self, investigation: &Investigation) -> WitnessResult<()> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let stored = state
            .investigations
            .iter_mut()
            .find(|i| i.investigation_id == investigation.investigation_id)
            .ok_or(WitnessError::InvestigationNotFound(investigation.investigation_id))?;
        if !stored.is_active() {
            return Err(WitnessError::AlreadyResolved {
                id: stored.investigation_id,
                status: stored.status.label().to_owned(),
            });
        }
        *stored = investigation.clone();
        Ok(())
    }

    async fn get(&self, investigation_id: Uuid) -> WitnessResult<Option<Investigation>> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state
            .investigations
            .iter()
            .find(|i| i.investigation_id == investigation_id)
            .cloned())
    }

    async fn list(&self) -> WitnessResult<Vec<Investigation>> {
        Ok(self.inner.read().map_err(|_| poisoned())?.investigations.clone())
    }

    async fn set_pair_status(
        &self,
        pair_key: &str,
        status: Option<PairStatus>,
    ) -> WitnessResult<()> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        match status {
            Some(status) => {
                state.pair_status.insert(pair_key.to_owned(), status);
            }
            None => {
                state.pair_status.remove(pair_key);
            }
        }
        Ok(())
    }

    async fn pair_statuses(&self) -> WitnessResult<HashMap<String, PairStatus>> {
        Ok(self.inner.read().map_err(|_| poisoned())?.pair_status.clone())
    }
}
