use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledger_types::HaltState;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CollusionConfig;
use crate::error::{WitnessError, WitnessResult};
use crate::investigation::{
    Investigation, InvestigationTrigger, PairStatus, ResolutionOutcome,
};
use crate::pair::WitnessPair;
use crate::store::InvestigationStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    /// A verified integrity breach. Counts toward correlation.
    Confirmed,
    /// Suspicious but unverified. Kept as evidence only.
    Anomaly,
}

/// Witnesses implicated in one breach or anomaly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreachObservation {
    pub breach_id: String,
    pub witnesses: Vec<String>,
    pub kind: ObservationKind,
    pub observed_at: DateTime<Utc>,
}

impl BreachObservation {
    pub fn confirmed(breach_id: impl Into<String>, witnesses: Vec<String>) -> Self {
        Self {
            breach_id: breach_id.into(),
            witnesses,
            kind: ObservationKind::Confirmed,
            observed_at: Utc::now(),
        }
    }

    pub fn anomaly(breach_id: impl Into<String>, witnesses: Vec<String>) -> Self {
        Self {
            kind: ObservationKind::Anomaly,
            ..Self::confirmed(breach_id, witnesses)
        }
    }

    fn involves(&self, pair: &WitnessPair) -> bool {
        self.witnesses.iter().any(|w| w == pair.first())
            && self.witnesses.iter().any(|w| w == pair.second())
    }
}

struct DefenseState {
    window: VecDeque<BreachObservation>,
    anomalies: VecDeque<BreachObservation>,
    pair_status: HashMap<String, PairStatus>,
}

/// Tracks breach co-occurrence per witness pair and blocks suspicious pairs.
///
/// All state changes happen under one async mutex, so a pair crossing the
/// threshold is suspended and its investigation opened before any other
/// defense operation observes the state.
pub struct CollusionDefense {
    config: CollusionConfig,
    store: Arc<dyn InvestigationStore>,
    halt: Arc<HaltState>,
    state: Mutex<DefenseState>,
}

impl CollusionDefense {
    /// Build a defense over `store`, restoring persisted pair status.
    pub async fn load(
        config: CollusionConfig,
        store: Arc<dyn InvestigationStore>,
        halt: Arc<HaltState>,
    ) -> WitnessResult<Self> {
        config.validate()?;
        let pair_status = store.pair_statuses().await?;
        Ok(Self {
            config,
            store,
            halt,
            state: Mutex::new(DefenseState {
                window: VecDeque::new(),
                anomalies: VecDeque::new(),
                pair_status,
            }),
        })
    }

    pub fn config(&self) -> &CollusionConfig {
        &self.config
    }

    /// Record a breach or anomaly. Returns investigations opened as a result.
    ///
    /// Allowed while halted: breach evidence must still be captured.
    pub async fn record_breach(
        &self,
        observation: BreachObservation,
    ) -> WitnessResult<Vec<Investigation>> {
        let mut state = self.state.lock().await;

        if observation.kind == ObservationKind::Anomaly {
            state.anomalies.push_back(observation);
            while state.anomalies.len() > self.config.window_size {
                state.anomalies.pop_front();
            }
            return Ok(Vec::new());
        }

        let candidates = WitnessPair::all_pairs(&observation.witnesses);
        state.window.push_back(observation);
        while state.window.len() > self.config.window_size {
            state.window.pop_front();
        }

        if state.window.len() < self.config.min_breaches {
            return Ok(Vec::new());
        }

        let mut opened = Vec::new();
        for pair in candidates {
            let pair_key = pair.pair_key();
            if state.pair_status.contains_key(&pair_key) {
                continue;
            }
            let score = correlation_in(&state.window, &pair);
            if score <= self.config.correlation_threshold {
                continue;
            }

            let investigation = Investigation::open(
                pair.clone(),
                score,
                evidence_ids(&state.window, &pair),
                evidence_ids(&state.anomalies, &pair),
                Vec::new(),
                InvestigationTrigger::Automatic,
            );
            self.suspend(&mut state, &investigation).await?;
            warn!(
                pair = %pair_key,
                correlation = score,
                investigation_id = %investigation.investigation_id,
                "Witness pair suspended: correlation above threshold"
            );
            opened.push(investigation);
        }
        Ok(opened)
    }

    /// Co-occurrence ratio of `pair` over the current breach window.
    pub async fn correlation(&self, pair: &WitnessPair) -> f64 {
        correlation_in(&self.state.lock().await.window, pair)
    }

    /// Open an investigation by hand, suspending the pair.
    pub async fn trigger_investigation(
        &self,
        pair_key: &str,
        evidence: Vec<String>,
    ) -> WitnessResult<Uuid> {
        self.halt.check()?;
        let pair: WitnessPair = pair_key.parse()?;
        let mut state = self.state.lock().await;

        match state.pair_status.get(&pair.pair_key()) {
            Some(PairStatus::Banned { .. }) => {
                return Err(WitnessError::PairBanned(pair.pair_key()));
            }
            Some(PairStatus::Suspended { investigation_id }) => {
                return Err(WitnessError::InvestigationAlreadyOpen {
                    pair_key: pair.pair_key(),
                    investigation_id: *investigation_id,
                });
            }
            None => {}
        }

        let investigation = Investigation::open(
            pair.clone(),
            correlation_in(&state.window, &pair),
            evidence_ids(&state.window, &pair),
            evidence_ids(&state.anomalies, &pair),
            evidence,
            InvestigationTrigger::Manual,
        );
        self.suspend(&mut state, &investigation).await?;
        info!(
            pair = %pair.pair_key(),
            investigation_id = %investigation.investigation_id,
            "Investigation opened manually"
        );
        Ok(investigation.investigation_id)
    }

    /// Resolve an active investigation. `Cleared` reinstates the pair,
    /// `Confirmed` bans it permanently.
    pub async fn resolve_investigation(
        &self,
        investigation_id: Uuid,
        outcome: ResolutionOutcome,
        reason: &str,
        resolver: &str,
    ) -> WitnessResult<Investigation> {
        self.halt.check()?;
        let mut state = self.state.lock().await;

        let investigation = self
            .store
            .get(investigation_id)
            .await?
            .ok_or(WitnessError::InvestigationNotFound(investigation_id))?;
        let resolved = investigation.resolve(outcome, reason, resolver)?;
        let pair_key = resolved.pair_key();

        self.store.record_resolution(&resolved).await?;
        let status = match outcome {
            ResolutionOutcome::Cleared => None,
            ResolutionOutcome::Confirmed => Some(PairStatus::Banned { investigation_id }),
        };
        self.store.set_pair_status(&pair_key, status.clone()).await?;
        match status {
            Some(status) => {
                state.pair_status.insert(pair_key.clone(), status);
            }
            None => {
                state.pair_status.remove(&pair_key);
            }
        }

        info!(
            pair = %pair_key,
            investigation_id = %investigation_id,
            outcome = ?outcome,
            resolver = %resolver,
            "Investigation resolved"
        );
        Ok(resolved)
    }

    pub async fn investigation(&self, investigation_id: Uuid) -> WitnessResult<Option<Investigation>> {
        self.store.get(investigation_id).await
    }

    pub async fn investigations(&self) -> WitnessResult<Vec<Investigation>> {
        self.store.list().await
    }

    pub async fn pair_status(&self, pair: &WitnessPair) -> Option<PairStatus> {
        self.state.lock().await.pair_status.get(&pair.pair_key()).cloned()
    }

    /// Keys of every suspended or banned pair.
    pub async fn blocked_pairs(&self) -> HashSet<String> {
        self.state.lock().await.pair_status.keys().cloned().collect()
    }

    async fn suspend(
        &self,
        state: &mut DefenseState,
        investigation: &Investigation,
    ) -> WitnessResult<()> {
        let status = PairStatus::Suspended {
            investigation_id: investigation.investigation_id,
        };
        self.store.insert(investigation).await?;
        self.store
            .set_pair_status(&investigation.pair_key(), Some(status.clone()))
            .await?;
        state.pair_status.insert(investigation.pair_key(), status);
        Ok(())
    }
}

fn correlation_in(window: &VecDeque<BreachObservation>, pair: &WitnessPair) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let together = window.iter().filter(|b| b.involves(pair)).count();
    together as f64 / window.len() as f64
}

fn evidence_ids(observations: &VecDeque<BreachObservation>, pair: &WitnessPair) -> Vec<String> {
    observations
        .iter()
        .filter(|b| b.involves(pair))
        .map(|b| b.breach_id.clone())
        .collect()
}
