use chrono::{DateTime, Utc};
use ledger_types::{Event, GENESIS_PREV_HASH, HASH_ALGORITHM};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whole-ledger export, genesis to head.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompleteExport {
    pub metadata: ExportMetadata,
    pub events: Vec<Event>,
    pub verification: ExportVerification,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub export_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub total_events: u64,
    /// Content hash of event 1.
    pub genesis_hash: Option<String>,
    pub latest_hash: Option<String>,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportVerification {
    pub hash_algorithm: String,
    /// Every content hash recomputes and every link holds.
    pub chain_valid: bool,
}

impl CompleteExport {
    pub fn new(events: Vec<Event>) -> Self {
        let chain_valid = chain_is_valid(&events);
        let metadata = ExportMetadata {
            export_id: Uuid::new_v4(),
            exported_at: Utc::now(),
            total_events: events.len() as u64,
            genesis_hash: events.first().map(|e| e.content_hash().to_owned()),
            latest_hash: events.last().map(|e| e.content_hash().to_owned()),
            first_sequence: events.first().map(Event::sequence_number),
            last_sequence: events.last().map(Event::sequence_number),
        };
        Self {
            metadata,
            events,
            verification: ExportVerification {
                hash_algorithm: HASH_ALGORITHM.to_owned(),
                chain_valid,
            },
        }
    }

    /// Count matches, sequences run 1..=N without gaps and every event
    /// links to its predecessor. True for an empty export.
    pub fn validate_completeness(&self) -> bool {
        if self.events.len() as u64 != self.metadata.total_events {
            return false;
        }
        let mut prev_hash: &str = GENESIS_PREV_HASH;
        for (index, event) in self.events.iter().enumerate() {
            if event.sequence_number() != index as u64 + 1 || event.prev_hash() != prev_hash {
                return false;
            }
            prev_hash = event.content_hash();
        }
        self.metadata.latest_hash.as_deref() == self.events.last().map(Event::content_hash)
    }
}

fn chain_is_valid(events: &[Event]) -> bool {
    let mut previous: Option<&Event> = None;
    for event in events {
        if !event.content_hash_matches() || !event.links_to(previous) {
            return false;
        }
        previous = Some(event);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::{compute_content_hash, EventParts};
    use serde_json::json;

    fn chain(n: u64) -> Vec<Event> {
        let mut prev = GENESIS_PREV_HASH.to_owned();
        (1..=n)
            .map(|seq| {
                let payload = json!({ "n": seq });
                let content_hash = compute_content_hash("vote.cast", &payload, &prev);
                let event = Event::from_parts(EventParts {
                    sequence_number: seq,
                    event_id: Uuid::new_v4(),
                    event_type: "vote.cast".into(),
                    actor_id: "archon-1".into(),
                    payload,
                    content_hash: content_hash.clone(),
                    prev_hash: prev.clone(),
                    signature: String::new(),
                    signing_key_id: "k".into(),
                    sig_alg_version: 1,
                    created_at: Utc::now(),
                });
                prev = content_hash;
                event
            })
            .collect()
    }

    #[test]
    fn empty_export_is_complete() {
        let export = CompleteExport::new(vec![]);
        assert_eq!(export.metadata.total_events, 0);
        assert!(export.events.is_empty());
        assert!(export.verification.chain_valid);
        assert!(export.validate_completeness());
    }

    #[test]
    fn full_export_is_complete() {
        let export = CompleteExport::new(chain(12));
        assert_eq!(export.metadata.first_sequence, Some(1));
        assert_eq!(export.metadata.last_sequence, Some(12));
        assert_eq!(export.verification.hash_algorithm, "SHA-256");
        assert!(export.verification.chain_valid);
        assert!(export.validate_completeness());
    }

    #[test]
    fn dropped_event_is_detected() {
        let mut export = CompleteExport::new(chain(5));
        export.events.remove(2);
        assert!(!export.validate_completeness());
    }

    #[test]
    fn truncated_tail_is_detected() {
        let mut export = CompleteExport::new(chain(5));
        export.events.pop();
        export.metadata.total_events = 4;
        assert!(!export.validate_completeness());
    }

    #[test]
    fn tampered_payload_invalidates_chain() {
        let mut events = chain(4);
        let mut parts = events[1].clone().into_parts();
        parts.payload = json!({ "n": "forged" });
        events[1] = Event::from_parts(parts);
        let export = CompleteExport::new(events);
        assert!(!export.verification.chain_valid);
    }
}
