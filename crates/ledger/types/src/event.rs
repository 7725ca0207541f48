use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hash::{compute_content_hash, GENESIS_PREV_HASH};

/// Versioned signature algorithm identifier carried by every event.
///
/// New algorithms get a new variant and version number; historical events keep
/// verifying under the version they were signed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Ed25519V1,
}

impl SignatureAlgorithm {
    pub const CURRENT: SignatureAlgorithm = SignatureAlgorithm::Ed25519V1;

    pub const fn version(self) -> u16 {
        match self {
            SignatureAlgorithm::Ed25519V1 => 1,
        }
    }

    pub fn from_version(version: u16) -> Option<Self> {
        match version {
            1 => Some(SignatureAlgorithm::Ed25519V1),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519V1 => "ed25519",
        }
    }
}

/// A candidate event before validation and signing.
///
/// `prev_hash` and `content_hash` are the values the producer *claims*; the
/// write-time pipeline recomputes both before anything is stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedEvent {
    pub event_type: String,
    pub actor_id: String,
    pub payload: Value,
    pub prev_hash: String,
    pub content_hash: String,
}

impl ProposedEvent {
    /// Build a proposal whose content hash is computed from the claimed `prev_hash`.
    pub fn new(
        event_type: impl Into<String>,
        actor_id: impl Into<String>,
        payload: Value,
        prev_hash: impl Into<String>,
    ) -> Self {
        let event_type = event_type.into();
        let prev_hash = prev_hash.into();
        let content_hash = compute_content_hash(&event_type, &payload, &prev_hash);
        Self {
            event_type,
            actor_id: actor_id.into(),
            payload,
            prev_hash,
            content_hash,
        }
    }

    /// Build a proposal carrying caller-supplied hashes verbatim.
    pub fn with_claimed_hashes(
        event_type: impl Into<String>,
        actor_id: impl Into<String>,
        payload: Value,
        prev_hash: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            actor_id: actor_id.into(),
            payload,
            prev_hash: prev_hash.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// Signature material binding an event to its actor and chain position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSignature {
    /// Hex-encoded signature bytes.
    pub signature: String,
    pub signing_key_id: String,
    pub sig_alg_version: u16,
    /// Instant the signature was produced; becomes the event's `created_at`.
    pub signed_at: DateTime<Utc>,
}

/// Raw stored fields of an event, used to rehydrate rows from storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventParts {
    pub sequence_number: u64,
    pub event_id: Uuid,
    pub event_type: String,
    pub actor_id: String,
    pub payload: Value,
    pub content_hash: String,
    pub prev_hash: String,
    pub signature: String,
    pub signing_key_id: String,
    pub sig_alg_version: u16,
    pub created_at: DateTime<Utc>,
}

/// An appended ledger event.
///
/// Immutable once constructed: fields are private and there is no setter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    sequence_number: u64,
    event_id: Uuid,
    event_type: String,
    actor_id: String,
    payload: Value,
    content_hash: String,
    prev_hash: String,
    signature: String,
    signing_key_id: String,
    sig_alg_version: u16,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Seal a validated, signed proposal at the given sequence number.
    pub fn seal(sequence_number: u64, proposal: ProposedEvent, signature: EventSignature) -> Self {
        Self {
            sequence_number,
            event_id: Uuid::new_v4(),
            event_type: proposal.event_type,
            actor_id: proposal.actor_id,
            payload: proposal.payload,
            content_hash: proposal.content_hash,
            prev_hash: proposal.prev_hash,
            signature: signature.signature,
            signing_key_id: signature.signing_key_id,
            sig_alg_version: signature.sig_alg_version,
            created_at: signature.signed_at,
        }
    }

    /// Rehydrate stored fields. No validation is performed; verifiers decide
    /// whether the result is sound.
    pub fn from_parts(parts: EventParts) -> Self {
        Self {
            sequence_number: parts.sequence_number,
            event_id: parts.event_id,
            event_type: parts.event_type,
            actor_id: parts.actor_id,
            payload: parts.payload,
            content_hash: parts.content_hash,
            prev_hash: parts.prev_hash,
            signature: parts.signature,
            signing_key_id: parts.signing_key_id,
            sig_alg_version: parts.sig_alg_version,
            created_at: parts.created_at,
        }
    }

    pub fn into_parts(self) -> EventParts {
        EventParts {
            sequence_number: self.sequence_number,
            event_id: self.event_id,
            event_type: self.event_type,
            actor_id: self.actor_id,
            payload: self.payload,
            content_hash: self.content_hash,
            prev_hash: self.prev_hash,
            signature: self.signature,
            signing_key_id: self.signing_key_id,
            sig_alg_version: self.sig_alg_version,
            created_at: self.created_at,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn signing_key_id(&self) -> &str {
        &self.signing_key_id
    }

    pub fn sig_alg_version(&self) -> u16 {
        self.sig_alg_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence_number == 1
    }

    /// Recompute the content hash from the stored event type, payload and prev hash.
    pub fn recompute_content_hash(&self) -> String {
        compute_content_hash(&self.event_type, &self.payload, &self.prev_hash)
    }

    pub fn content_hash_matches(&self) -> bool {
        self.recompute_content_hash() == self.content_hash
    }

    /// Does this event correctly link to `previous` (or to genesis when `None`)?
    pub fn links_to(&self, previous: Option<&Event>) -> bool {
        match previous {
            None => self.sequence_number == 1 && self.prev_hash == GENESIS_PREV_HASH,
            Some(prev) => {
                self.sequence_number == prev.sequence_number + 1
                    && self.prev_hash == prev.content_hash
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signature() -> EventSignature {
        EventSignature {
            signature: "ab".repeat(64),
            signing_key_id: "key-1".into(),
            sig_alg_version: SignatureAlgorithm::CURRENT.version(),
            signed_at: Utc::now(),
        }
    }

    #[test]
    fn sealed_event_preserves_proposal() {
        let proposal = ProposedEvent::new(
            "petition.submitted",
            "archon-7",
            json!({"aggregate_id": "p-1"}),
            GENESIS_PREV_HASH,
        );
        let sig = signature();
        let event = Event::seal(1, proposal.clone(), sig.clone());

        assert_eq!(event.sequence_number(), 1);
        assert_eq!(event.content_hash(), proposal.content_hash);
        assert_eq!(event.created_at(), sig.signed_at);
        assert!(event.content_hash_matches());
        assert!(event.links_to(None));
        assert!(event.is_genesis());
    }

    #[test]
    fn links_to_previous_event() {
        let first = Event::seal(
            1,
            ProposedEvent::new("ledger.genesis", "system", json!({}), GENESIS_PREV_HASH),
            signature(),
        );
        let second = Event::seal(
            2,
            ProposedEvent::new("vote.cast", "archon-1", json!({"v": 1}), first.content_hash()),
            signature(),
        );
        assert!(second.links_to(Some(&first)));
        assert!(!second.links_to(None));
        assert!(!first.links_to(Some(&second)));
    }

    #[test]
    fn tampered_parts_fail_hash_check() {
        let event = Event::seal(
            1,
            ProposedEvent::new("ledger.genesis", "system", json!({"n": 1}), GENESIS_PREV_HASH),
            signature(),
        );
        let mut parts = event.into_parts();
        parts.payload = json!({"n": 2});
        let tampered = Event::from_parts(parts);
        assert!(!tampered.content_hash_matches());
    }

    #[test]
    fn algorithm_versions_round_trip() {
        let alg = SignatureAlgorithm::CURRENT;
        assert_eq!(SignatureAlgorithm::from_version(alg.version()), Some(alg));
        assert_eq!(SignatureAlgorithm::from_version(99), None);
        assert_eq!(alg.name(), "ed25519");
    }
}
