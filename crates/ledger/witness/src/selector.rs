use std::collections::HashSet;
use std::sync::Arc;

use ledger_types::HaltState;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::defense::CollusionDefense;
use crate::entropy::EntropySource;
use crate::error::{WitnessError, WitnessResult};
use crate::pair::WitnessPair;

const SEED_CONTEXT: &str = "constitutional-ledger 2024 witness selection seed v1";

/// Outcome of one draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessSelection {
    pub witnesses: Vec<String>,
    /// Hex-encoded seed the ranking was derived from.
    pub seed: String,
}

/// Draws witnesses for each appended event.
///
/// The ranking is a keyed hash of every pool member under a seed derived
/// from the chain head, fresh external entropy and the event sequence, so
/// nobody can predict or steer it ahead of the append.
pub struct WitnessSelector {
    pool: Vec<String>,
    witnesses_per_event: usize,
    entropy: Arc<dyn EntropySource>,
    defense: Arc<CollusionDefense>,
    halt: Arc<HaltState>,
}

impl WitnessSelector {
    pub fn new(
        pool: Vec<String>,
        witnesses_per_event: usize,
        entropy: Arc<dyn EntropySource>,
        defense: Arc<CollusionDefense>,
        halt: Arc<HaltState>,
    ) -> WitnessResult<Self> {
        if witnesses_per_event == 0 {
            return Err(WitnessError::InvalidConfig(
                "witnesses_per_event must be positive".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = pool.iter().find(|w| !seen.insert(w.as_str())) {
            return Err(WitnessError::InvalidConfig(format!("duplicate witness {dup}")));
        }
        Ok(Self {
            pool,
            witnesses_per_event,
            entropy,
            defense,
            halt,
        })
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    pub fn witnesses_per_event(&self) -> usize {
        self.witnesses_per_event
    }

    pub async fn select(&self, head_hash: &str, sequence: u64) -> WitnessResult<WitnessSelection> {
        self.halt.check()?;

        let entropy = self.entropy.entropy().await?;
        let seed = derive_seed(head_hash, &entropy, sequence);
        let ranked = rank_pool(&self.pool, &seed);
        let blocked = self.defense.blocked_pairs().await;

        let witnesses = choose(&ranked, self.witnesses_per_event, &blocked).ok_or_else(|| {
            WitnessError::InsufficientWitnesses {
                required: self.witnesses_per_event,
                available: largest_unblocked_prefix(&ranked, &blocked),
            }
        })?;

        info!(
            sequence = sequence,
            witnesses = ?witnesses,
            blocked_pairs = blocked.len(),
            "Witnesses selected"
        );
        Ok(WitnessSelection {
            witnesses,
            seed: hex::encode(seed),
        })
    }
}

/// blake3 key derivation over (head hash, entropy, sequence).
pub fn derive_seed(head_hash: &str, entropy: &[u8; 32], sequence: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(SEED_CONTEXT);
    hasher.update(head_hash.as_bytes());
    hasher.update(entropy);
    hasher.update(&sequence.to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// Pool ordered by `blake3_keyed(seed, witness_id)`.
pub fn rank_pool(pool: &[String], seed: &[u8; 32]) -> Vec<String> {
    let mut scored: Vec<([u8; 32], &String)> = pool
        .iter()
        .map(|w| (*blake3::keyed_hash(seed, w.as_bytes()).as_bytes(), w))
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, w)| w.clone()).collect()
}

/// First set of `n` witnesses in rank order with no blocked pair among them.
fn choose(ranked: &[String], n: usize, blocked: &HashSet<String>) -> Option<Vec<String>> {
    fn search(
        ranked: &[String],
        start: usize,
        n: usize,
        blocked: &HashSet<String>,
        chosen: &mut Vec<String>,
    ) -> bool {
        if chosen.len() == n {
            return true;
        }
        for (offset, candidate) in ranked[start..].iter().enumerate() {
            if ranked.len() - (start + offset) < n - chosen.len() {
                return false;
            }
            let clashes = chosen
                .iter()
                .any(|c| blocked.contains(&WitnessPair::new(c.clone(), candidate.clone()).pair_key()));
            if clashes {
                continue;
            }
            chosen.push(candidate.clone());
            if search(ranked, start + offset + 1, n, blocked, chosen) {
                return true;
            }
            chosen.pop();
        }
        false
    }

    let mut chosen = Vec::with_capacity(n);
    if search(ranked, 0, n, blocked, &mut chosen) {
        Some(chosen)
    } else {
        debug!(required = n, pool = ranked.len(), "No unblocked witness set");
        None
    }
}

fn largest_unblocked_prefix(ranked: &[String], blocked: &HashSet<String>) -> usize {
    let mut chosen: Vec<&String> = Vec::new();
    for candidate in ranked {
        let clashes = chosen
            .iter()
            .any(|c| blocked.contains(&WitnessPair::new(c.as_str(), candidate.as_str()).pair_key()));
        if !clashes {
            chosen.push(candidate);
        }
    }
    chosen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollusionConfig;
    use crate::entropy::FixedEntropySource;
    use crate::investigation::ResolutionOutcome;
    use crate::store::InMemoryInvestigationStore;

    async fn selector(pool: &[&str], n: usize) -> (WitnessSelector, Arc<CollusionDefense>, Arc<HaltState>) {
        let halt = HaltState::shared();
        let defense = Arc::new(
            CollusionDefense::load(
                CollusionConfig::default(),
                Arc::new(InMemoryInvestigationStore::new()),
                halt.clone(),
            )
            .await
            .unwrap(),
        );
        let selector = WitnessSelector::new(
            pool.iter().map(|s| s.to_string()).collect(),
            n,
            Arc::new(FixedEntropySource([7u8; 32])),
            defense.clone(),
            halt.clone(),
        )
        .unwrap();
        (selector, defense, halt)
    }

    fn has_pair(selection: &WitnessSelection, a: &str, b: &str) -> bool {
        selection.witnesses.iter().any(|w| w == a) && selection.witnesses.iter().any(|w| w == b)
    }

    #[tokio::test]
    async fn selection_is_reproducible_for_same_inputs() {
        let (selector, _, _) = selector(&["w1", "w2", "w3", "w4", "w5"], 3).await;
        let a = selector.select(&"a".repeat(64), 4).await.unwrap();
        let b = selector.select(&"a".repeat(64), 4).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.witnesses.len(), 3);
        assert_eq!(a.seed.len(), 64);
    }

    #[tokio::test]
    async fn suspended_pair_is_never_selected_until_cleared() {
        let (selector, defense, _) = selector(&["w1", "w2", "w3"], 2).await;
        let id = defense.trigger_investigation("w1|w2", vec![]).await.unwrap();

        for seq in 1..=60 {
            let selection = selector.select(&"c".repeat(64), seq).await.unwrap();
            assert!(!has_pair(&selection, "w1", "w2"), "sequence {seq}");
        }

        defense
            .resolve_investigation(id, ResolutionOutcome::Cleared, "false positive", "steward-1")
            .await
            .unwrap();
        let mut seen_together = false;
        for seq in 1..=60 {
            let selection = selector.select(&"c".repeat(64), seq).await.unwrap();
            seen_together |= has_pair(&selection, "w1", "w2");
        }
        assert!(seen_together);
    }

    #[tokio::test]
    async fn impossible_selection_reports_insufficient_witnesses() {
        let (selector, defense, _) = selector(&["w1", "w2"], 2).await;
        defense.trigger_investigation("w1|w2", vec![]).await.unwrap();
        assert_eq!(
            selector.select(&"d".repeat(64), 1).await.unwrap_err(),
            WitnessError::InsufficientWitnesses {
                required: 2,
                available: 1
            }
        );
    }

    #[tokio::test]
    async fn selection_refused_once_halted() {
        let (selector, _, halt) = selector(&["w1", "w2", "w3"], 2).await;
        halt.trigger("integrity breach");
        assert!(matches!(
            selector.select(&"e".repeat(64), 1).await.unwrap_err(),
            WitnessError::Halted(_)
        ));
    }

    #[test]
    fn backtracking_finds_set_greedy_would_miss() {
        // Ranked w1, w2, w3, w4 with w1 blocked against w3 and w4: greedy
        // takes w1 and w2 then stalls; the only valid triple is w2, w3, w4.
        let ranked: Vec<String> = ["w1", "w2", "w3", "w4"].iter().map(|s| s.to_string()).collect();
        let blocked: HashSet<String> = ["w1|w3", "w1|w4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(choose(&ranked, 3, &blocked).unwrap(), vec!["w2", "w3", "w4"]);
    }

    #[test]
    fn duplicate_pool_members_are_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let halt = HaltState::shared();
        let defense = Arc::new(
            rt.block_on(CollusionDefense::load(
                CollusionConfig::default(),
                Arc::new(InMemoryInvestigationStore::new()),
                halt.clone(),
            ))
            .unwrap(),
        );
        let result = WitnessSelector::new(
            vec!["w1".into(), "w1".into()],
            1,
            Arc::new(FixedEntropySource([0u8; 32])),
            defense,
            halt,
        );
        assert!(matches!(result, Err(WitnessError::InvalidConfig(_))));
    }
}
