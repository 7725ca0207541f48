use std::sync::Arc;

use chrono::{Duration, Utc};
use ledger_service::{ConstitutionalLedger, LedgerConfig, LedgerParts};
use ledger_signing::{generate_agent_key, InMemoryKeySource};
use ledger_types::HaltState;
use ledger_witness::FixedEntropySource;

pub const AGENTS: [&str; 3] = ["archon-1", "archon-2", "steward"];

pub struct Harness {
    pub ledger: ConstitutionalLedger,
    pub keys: Arc<InMemoryKeySource>,
    pub halt: Arc<HaltState>,
}

pub async fn harness() -> Harness {
    harness_with(LedgerParts::in_memory(Arc::new(InMemoryKeySource::new())), None).await
}

/// Assemble a ledger over `parts` and enroll the standard agents. When
/// `keys` is given the agents are assumed to be enrolled already.
pub async fn harness_with(parts: LedgerParts, keys: Option<Arc<InMemoryKeySource>>) -> Harness {
    let enrolled = keys.is_some();
    let keys = keys.unwrap_or_else(|| Arc::new(InMemoryKeySource::new()));
    let mut parts = parts.with_entropy(Arc::new(FixedEntropySource([7; 32])));
    parts.key_source = keys.clone();

    let halt = HaltState::shared();
    let ledger = ConstitutionalLedger::assemble(parts, &LedgerConfig::default(), halt.clone())
        .await
        .unwrap();

    if !enrolled {
        for agent in AGENTS {
            enroll(&ledger, &keys, agent, "k1").await;
        }
    }
    Harness { ledger, keys, halt }
}

pub async fn enroll(ledger: &ConstitutionalLedger, keys: &InMemoryKeySource, agent: &str, tag: &str) {
    let (key, signing_key) =
        generate_agent_key(agent, format!("{agent}-{tag}"), Utc::now() - Duration::hours(1));
    keys.insert(key.key_id.clone(), signing_key).unwrap();
    ledger.key_registry().register(key).await.unwrap();
}
