use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{WitnessError, WitnessResult};

/// Which witnesses attested an appended event, and the seed that chose them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessAttestation {
    pub sequence_number: u64,
    pub witnesses: Vec<String>,
    /// Hex selection seed; with the recorded entropy it reproduces the draw.
    pub seed: String,
    pub recorded_at: DateTime<Utc>,
}

/// Durable record of which witnesses attested each event. Attestations are
/// write-once.
#[async_trait]
pub trait AttestationStore: Send + Sync {
    async fn record(&self, attestation: &WitnessAttestation) -> WitnessResult<()>;

    async fn get(&self, sequence_number: u64) -> WitnessResult<Option<WitnessAttestation>>;

    /// Witnesses of `sequence_number`; empty when none were recorded.
    async fn witnesses_for(&self, sequence_number: u64) -> WitnessResult<Vec<String>> {
        Ok(self
            .get(sequence_number)
            .await?
            .map(|a| a.witnesses)
            .unwrap_or_default())
    }
}

/// Sequence-indexed attestation history held in memory.
#[derive(Default)]
pub struct InMemoryAttestationStore {
    entries: RwLock<BTreeMap<u64, WitnessAttestation>>,
}

impl InMemoryAttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> WitnessError {
    WitnessError::Backend("attestation store lock poisoned".into())
}

#[async_trait]
impl AttestationStore for InMemoryAttestationStore {
    async fn record(&self, attestation: &WitnessAttestation) -> WitnessResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(&attestation.sequence_number) {
            return Err(WitnessError::DuplicateAttestation(attestation.sequence_number));
        }
        entries.insert(attestation.sequence_number, attestation.clone());
        Ok(())
    }

    async fn get(&self, sequence_number: u64) -> WitnessResult<Option<WitnessAttestation>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .get(&sequence_number)
            .cloned())
    }
}
