use std::sync::Arc;

use async_trait::async_trait;
use ledger_integrity::{BreachListener, BreachRecord};
use ledger_witness::{AttestationStore, BreachObservation, CollusionDefense};
use tracing::{error, warn};

/// Feeds chain breaches to collusion defense as observations against the
/// witnesses that attested the breached event.
pub struct WitnessBreachReporter {
    attestations: Arc<dyn AttestationStore>,
    defense: Arc<CollusionDefense>,
}

impl WitnessBreachReporter {
    pub fn new(attestations: Arc<dyn AttestationStore>, defense: Arc<CollusionDefense>) -> Self {
        Self {
            attestations,
            defense,
        }
    }
}

#[async_trait]
impl BreachListener for WitnessBreachReporter {
    async fn on_breach(&self, breach: &BreachRecord) {
        let Some(sequence) = breach.sequence_number else {
            return;
        };
        let witnesses = match self.attestations.witnesses_for(sequence).await {
            Ok(witnesses) => witnesses,
            Err(e) => {
                error!(sequence = sequence, error = %e, "Attestation lookup failed");
                return;
            }
        };
        if witnesses.is_empty() {
            warn!(sequence = sequence, "Breached event has no recorded witnesses");
            return;
        }

        let observation = BreachObservation::confirmed(breach.breach_id.to_string(), witnesses);
        if let Err(e) = self.defense.record_breach(observation).await {
            error!(breach_id = %breach.breach_id, error = %e, "Collusion defense rejected breach");
        }
    }
}
