use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{SigningError, SigningResult};

/// A public key bound to an agent for a half-open validity window
/// `[active_from, active_until)`. `active_until == None` means still active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentKey {
    pub agent_id: String,
    pub key_id: String,
    /// Hex-encoded 32-byte Ed25519 public key.
    pub public_key: String,
    pub active_from: DateTime<Utc>,
    pub active_until: Option<DateTime<Utc>>,
}

impl AgentKey {
    pub fn new(
        agent_id: impl Into<String>,
        key_id: impl Into<String>,
        verifying_key: &VerifyingKey,
        active_from: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            key_id: key_id.into(),
            public_key: hex::encode(verifying_key.as_bytes()),
            active_from,
            active_until: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.active_until.is_none()
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.active_from <= at && self.active_until.map_or(true, |until| at < until)
    }

    /// Whether two windows share at least one instant.
    pub fn overlaps(&self, other: &AgentKey) -> bool {
        let self_before_other = self.active_until.is_some_and(|u| u <= other.active_from);
        let other_before_self = other.active_until.is_some_and(|u| u <= self.active_from);
        !(self_before_other || other_before_self)
    }

    pub fn verifying_key(&self) -> SigningResult<VerifyingKey> {
        let bytes = hex::decode(&self.public_key)
            .map_err(|e| SigningError::InvalidKeyMaterial(format!("{}: {e}", self.key_id)))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SigningError::InvalidKeyMaterial(format!("{}: expected 32 bytes", self.key_id))
        })?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| SigningError::InvalidKeyMaterial(format!("{}: {e}", self.key_id)))
    }
}

/// Generate a fresh keypair from the OS RNG. Used by the key ceremony tooling
/// and tests.
pub fn generate_agent_key(
    agent_id: impl Into<String>,
    key_id: impl Into<String>,
    active_from: DateTime<Utc>,
) -> (AgentKey, SigningKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let key = AgentKey::new(agent_id, key_id, &signing_key.verifying_key(), active_from);
    (key, signing_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_is_half_open() {
        let t0 = Utc::now();
        let (mut key, _) = generate_agent_key("archon-1", "k1", t0);
        key.active_until = Some(t0 + Duration::hours(1));

        assert!(!key.is_active_at(t0 - Duration::seconds(1)));
        assert!(key.is_active_at(t0));
        assert!(key.is_active_at(t0 + Duration::minutes(59)));
        assert!(!key.is_active_at(t0 + Duration::hours(1)));
    }

    #[test]
    fn adjacent_windows_do_not_overlap() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::hours(1);
        let (mut first, _) = generate_agent_key("archon-1", "k1", t0);
        first.active_until = Some(t1);
        let (second, _) = generate_agent_key("archon-1", "k2", t1);
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));

        let (early, _) = generate_agent_key("archon-1", "k3", t0 + Duration::minutes(30));
        assert!(first.overlaps(&early));
    }

    #[test]
    fn public_key_roundtrips_through_hex() {
        let (key, signing_key) = generate_agent_key("archon-1", "k1", Utc::now());
        assert_eq!(key.public_key.len(), 64);
        assert_eq!(key.verifying_key().unwrap(), signing_key.verifying_key());
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        let (mut key, _) = generate_agent_key("archon-1", "k1", Utc::now());
        key.public_key = "abcd".into();
        assert!(matches!(
            key.verifying_key(),
            Err(SigningError::InvalidKeyMaterial(_))
        ));
    }
}
