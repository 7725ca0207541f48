use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use ledger_types::{canonicalize, Event, EventSignature, HaltState, SignatureAlgorithm};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{SigningError, SigningResult};
use crate::key::AgentKey;
use crate::registry::KeyRegistry;
use crate::source::KeySource;

/// Canonical bytes an event signature covers.
pub fn signable_content(content_hash: &str, prev_hash: &str, actor_id: &str) -> String {
    canonicalize(&json!({
        "content_hash": content_hash,
        "prev_hash": prev_hash,
        "actor_id": actor_id,
    }))
}

/// Signs events with the actor's active key and verifies stored events
/// against the key that was active at their creation.
pub struct SigningService {
    registry: Arc<dyn KeyRegistry>,
    keys: Arc<dyn KeySource>,
    halt: Arc<HaltState>,
}

impl SigningService {
    pub fn new(
        registry: Arc<dyn KeyRegistry>,
        keys: Arc<dyn KeySource>,
        halt: Arc<HaltState>,
    ) -> Self {
        Self {
            registry,
            keys,
            halt,
        }
    }

    pub fn registry(&self) -> &Arc<dyn KeyRegistry> {
        &self.registry
    }

    pub async fn sign(
        &self,
        content_hash: &str,
        prev_hash: &str,
        actor_id: &str,
    ) -> SigningResult<EventSignature> {
        self.halt.check()?;

        let signed_at = Utc::now();
        let key = self
            .registry
            .key_active_at(actor_id, signed_at)
            .await?
            .ok_or_else(|| SigningError::NoActiveKey {
                agent_id: actor_id.to_owned(),
            })?;
        let signing_key = self
            .keys
            .signing_key(&key.key_id)
            .await?
            .ok_or_else(|| SigningError::PrivateKeyUnavailable {
                key_id: key.key_id.clone(),
            })?;

        let registered = key.verifying_key()?;
        if signing_key.verifying_key() != registered {
            return Err(SigningError::KeyMismatch {
                expected: key.public_key.clone(),
                actual: hex::encode(signing_key.verifying_key().as_bytes()),
            });
        }

        let signature = sign_signable(
            SignatureAlgorithm::CURRENT,
            &signing_key,
            &signable_content(content_hash, prev_hash, actor_id),
        );
        debug!(actor_id = %actor_id, key_id = %key.key_id, "Signature produced");

        Ok(EventSignature {
            signature,
            signing_key_id: key.key_id,
            sig_alg_version: SignatureAlgorithm::CURRENT.version(),
            signed_at,
        })
    }

    /// Verify a stored event's signature under the key active at `created_at`.
    pub async fn verify(&self, event: &Event) -> SigningResult<()> {
        let algorithm = SignatureAlgorithm::from_version(event.sig_alg_version())
            .ok_or(SigningError::UnsupportedAlgorithm(event.sig_alg_version()))?;

        let key = self
            .registry
            .key_active_at(event.actor_id(), event.created_at())
            .await?
            .ok_or_else(|| SigningError::NoKeyAtInstant {
                agent_id: event.actor_id().to_owned(),
                at: event.created_at(),
            })?;
        if key.key_id != event.signing_key_id() {
            return Err(SigningError::KeyMismatch {
                expected: event.signing_key_id().to_owned(),
                actual: key.key_id,
            });
        }

        let signable = signable_content(event.content_hash(), event.prev_hash(), event.actor_id());
        verify_signable(algorithm, &key, &signable, event.signature()).inspect_err(|err| {
            warn!(sequence = event.sequence_number(), error = %err, "Signature rejected");
        })
    }

    /// Halt-checked key rotation.
    pub async fn rotate_key(
        &self,
        agent_id: &str,
        new_key: AgentKey,
        at: DateTime<Utc>,
    ) -> SigningResult<AgentKey> {
        self.halt.check()?;
        let closed = self.registry.rotate(agent_id, new_key, at).await?;
        info!(agent_id = %agent_id, retired_key = %closed.key_id, "Key rotation accepted");
        Ok(closed)
    }
}

/// Produce a hex signature over `signable` under `algorithm`.
pub(crate) fn sign_signable(
    algorithm: SignatureAlgorithm,
    signing_key: &SigningKey,
    signable: &str,
) -> String {
    match algorithm {
        SignatureAlgorithm::Ed25519V1 => {
            hex::encode(signing_key.sign(signable.as_bytes()).to_bytes())
        }
    }
}

pub(crate) fn verify_signable(
    algorithm: SignatureAlgorithm,
    key: &AgentKey,
    signable: &str,
    signature_hex: &str,
) -> SigningResult<()> {
    match algorithm {
        SignatureAlgorithm::Ed25519V1 => {
            let bytes = hex::decode(signature_hex)
                .map_err(|e| SigningError::SignatureInvalid(format!("not hex: {e}")))?;
            let bytes: [u8; 64] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| SigningError::SignatureInvalid("expected 64 bytes".into()))?;
            key.verifying_key()?
                .verify(signable.as_bytes(), &Signature::from_bytes(&bytes))
                .map_err(|e| SigningError::SignatureInvalid(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_agent_key;
    use crate::registry::InMemoryKeyRegistry;
    use crate::source::InMemoryKeySource;
    use chrono::Duration;
    use ledger_types::{ProposedEvent, GENESIS_PREV_HASH};
    use proptest::prelude::*;
    use serde_json::json;

    async fn service_with_key(agent: &str) -> (SigningService, Arc<HaltState>, SigningKey) {
        let registry = Arc::new(InMemoryKeyRegistry::new());
        let source = Arc::new(InMemoryKeySource::new());
        let (key, signing_key) =
            generate_agent_key(agent, format!("{agent}-k1"), Utc::now() - Duration::hours(1));
        source.insert(key.key_id.clone(), signing_key.clone()).unwrap();
        registry.register(key).await.unwrap();
        let halt = HaltState::shared();
        (
            SigningService::new(registry, source, halt.clone()),
            halt,
            signing_key,
        )
    }

    fn sealed(proposal: ProposedEvent, signature: EventSignature) -> Event {
        Event::seal(1, proposal, signature)
    }

    #[test]
    fn signable_content_is_canonical() {
        assert_eq!(
            signable_content("c", "p", "a"),
            r#"{"actor_id":"a","content_hash":"c","prev_hash":"p"}"#
        );
    }

    #[tokio::test]
    async fn sign_then_verify() {
        let (service, _, _) = service_with_key("archon-1").await;
        let proposal = ProposedEvent::new("vote.cast", "archon-1", json!({}), GENESIS_PREV_HASH);
        let signature = service
            .sign(&proposal.content_hash, &proposal.prev_hash, "archon-1")
            .await
            .unwrap();
        assert_eq!(signature.signing_key_id, "archon-1-k1");
        assert_eq!(signature.sig_alg_version, 1);

        service.verify(&sealed(proposal, signature)).await.unwrap();
    }

    #[tokio::test]
    async fn altered_content_fails_verification() {
        let (service, _, _) = service_with_key("archon-1").await;
        let proposal = ProposedEvent::new("vote.cast", "archon-1", json!({}), GENESIS_PREV_HASH);
        let signature = service
            .sign(&proposal.content_hash, &proposal.prev_hash, "archon-1")
            .await
            .unwrap();

        let mut parts = sealed(proposal, signature).into_parts();
        parts.content_hash = "a".repeat(64);
        let err = service.verify(&Event::from_parts(parts)).await.unwrap_err();
        assert!(matches!(err, SigningError::SignatureInvalid(_)));
        assert!(err.is_verification_failure());
    }

    #[tokio::test]
    async fn unknown_algorithm_version_is_rejected() {
        let (service, _, _) = service_with_key("archon-1").await;
        let proposal = ProposedEvent::new("vote.cast", "archon-1", json!({}), GENESIS_PREV_HASH);
        let signature = service
            .sign(&proposal.content_hash, &proposal.prev_hash, "archon-1")
            .await
            .unwrap();
        let mut parts = sealed(proposal, signature).into_parts();
        parts.sig_alg_version = 9;
        assert_eq!(
            service.verify(&Event::from_parts(parts)).await.unwrap_err(),
            SigningError::UnsupportedAlgorithm(9)
        );
    }

    #[tokio::test]
    async fn unknown_actor_cannot_sign() {
        let (service, _, _) = service_with_key("archon-1").await;
        let err = service
            .sign(&"a".repeat(64), GENESIS_PREV_HASH, "stranger")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SigningError::NoActiveKey {
                agent_id: "stranger".into()
            }
        );
    }

    #[tokio::test]
    async fn signing_is_refused_once_halted() {
        let (service, halt, _) = service_with_key("archon-1").await;
        halt.trigger("chain breach at 50");
        let err = service
            .sign(&"a".repeat(64), GENESIS_PREV_HASH, "archon-1")
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::Halted(_)));
    }

    #[tokio::test]
    async fn rotation_is_refused_once_halted() {
        let (service, halt, _) = service_with_key("archon-1").await;
        halt.trigger("collusion confirmed");
        let now = Utc::now();
        let (k2, _) = generate_agent_key("archon-1", "archon-1-k2", now);
        let err = service.rotate_key("archon-1", k2, now).await.unwrap_err();
        assert!(matches!(err, SigningError::Halted(_)));
        assert_eq!(service.registry().keys_for("archon-1").await.unwrap().len(), 1);
    }

    /// Build a registry with k1 on [t0, t1) and k2 on [t1, ..), and an event
    /// signed by k1 whose created_at is `t0 + offset_secs`.
    async fn windowed_case(offset_secs: i64) -> (SigningService, Event) {
        let registry = Arc::new(InMemoryKeyRegistry::new());
        let t0 = Utc::now() - Duration::days(10);
        let t1 = t0 + Duration::days(5);
        let (k1, sk1) = generate_agent_key("archon-1", "k1", t0);
        let (k2, _) = generate_agent_key("archon-1", "k2", t1);
        registry.register(k1).await.unwrap();
        registry.rotate("archon-1", k2, t1).await.unwrap();

        let proposal = ProposedEvent::new("vote.cast", "archon-1", json!({}), GENESIS_PREV_HASH);
        let signature = sign_signable(
            SignatureAlgorithm::Ed25519V1,
            &sk1,
            &signable_content(&proposal.content_hash, &proposal.prev_hash, "archon-1"),
        );
        let event = Event::seal(
            1,
            proposal,
            EventSignature {
                signature,
                signing_key_id: "k1".into(),
                sig_alg_version: 1,
                signed_at: t0 + Duration::seconds(offset_secs),
            },
        );
        let service = SigningService::new(
            registry,
            Arc::new(InMemoryKeySource::new()),
            HaltState::shared(),
        );
        (service, event)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn signature_valid_only_inside_signing_key_window(offset in -86_400i64..(10 * 86_400)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (service, event) = rt.block_on(windowed_case(offset));
            let result = rt.block_on(service.verify(&event));
            let in_k1_window = (0..5 * 86_400).contains(&offset);
            prop_assert_eq!(result.is_ok(), in_k1_window);
        }
    }
}
