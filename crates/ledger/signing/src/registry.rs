use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{SigningError, SigningResult};
use crate::key::AgentKey;

/// Temporal key store. Keys are registered and rotated, never deleted.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Every key ever registered for the agent, oldest first.
    async fn keys_for(&self, agent_id: &str) -> SigningResult<Vec<AgentKey>>;

    /// The key whose window contains `at`, if any.
    async fn key_active_at(
        &self,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> SigningResult<Option<AgentKey>> {
        Ok(self
            .keys_for(agent_id)
            .await?
            .into_iter()
            .find(|key| key.is_active_at(at)))
    }

    async fn active_key(&self, agent_id: &str) -> SigningResult<Option<AgentKey>> {
        self.key_active_at(agent_id, Utc::now()).await
    }

    /// Add a key issued by the key ceremony. Windows of one agent never overlap.
    async fn register(&self, key: AgentKey) -> SigningResult<()>;

    /// Close the agent's open key at `at` and register `new_key` starting at
    /// `at`, as one step. Returns the closed key.
    async fn rotate(
        &self,
        agent_id: &str,
        new_key: AgentKey,
        at: DateTime<Utc>,
    ) -> SigningResult<AgentKey>;

    /// Keys cannot be deleted; revocation is rotation.
    async fn delete(&self, key_id: &str) -> SigningResult<()> {
        Err(SigningError::KeyDeletionForbidden {
            key_id: key_id.to_owned(),
        })
    }
}

/// Checks shared by registry backends before a rotation is applied.
pub(crate) fn check_rotation(
    agent_id: &str,
    current: &AgentKey,
    new_key: &AgentKey,
    at: DateTime<Utc>,
) -> SigningResult<()> {
    if new_key.agent_id != agent_id {
        return Err(SigningError::InvalidKeyWindow(format!(
            "key {} belongs to {}, not {agent_id}",
            new_key.key_id, new_key.agent_id
        )));
    }
    if new_key.active_from != at || !new_key.is_open() {
        return Err(SigningError::InvalidKeyWindow(format!(
            "rotated key {} must open at {at} with no end",
            new_key.key_id
        )));
    }
    if at <= current.active_from {
        return Err(SigningError::InvalidKeyWindow(format!(
            "rotation at {at} precedes start of key {}",
            current.key_id
        )));
    }
    Ok(())
}

#[derive(Default)]
struct RegistryState {
    by_agent: HashMap<String, Vec<AgentKey>>,
    agent_of_key: HashMap<String, String>,
}

impl RegistryState {
    fn check_insert(&self, key: &AgentKey) -> SigningResult<()> {
        if self.agent_of_key.contains_key(&key.key_id) {
            return Err(SigningError::DuplicateKey(key.key_id.clone()));
        }
        if let Some(until) = key.active_until {
            if until <= key.active_from {
                return Err(SigningError::InvalidKeyWindow(format!(
                    "key {} ends before it starts",
                    key.key_id
                )));
            }
        }
        key.verifying_key()?;
        let existing = self.by_agent.get(&key.agent_id).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(clash) = existing.iter().find(|k| k.overlaps(key)) {
            return Err(SigningError::InvalidKeyWindow(format!(
                "key {} overlaps key {}",
                key.key_id, clash.key_id
            )));
        }
        Ok(())
    }

    fn insert(&mut self, key: AgentKey) {
        self.agent_of_key
            .insert(key.key_id.clone(), key.agent_id.clone());
        let keys = self.by_agent.entry(key.agent_id.clone()).or_default();
        keys.push(key);
        keys.sort_by_key(|k| k.active_from);
    }
}

#[derive(Default)]
pub struct InMemoryKeyRegistry {
    inner: RwLock<RegistryState>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyRegistry for InMemoryKeyRegistry {
    async fn keys_for(&self, agent_id: &str) -> SigningResult<Vec<AgentKey>> {
        let state = self
            .inner
            .read()
            .map_err(|_| SigningError::Backend("key registry lock poisoned".into()))?;
        Ok(state.by_agent.get(agent_id).cloned().unwrap_or_default())
    }

    async fn register(&self, key: AgentKey) -> SigningResult<()> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| SigningError::Backend("key registry lock poisoned".into()))?;
        state.check_insert(&key)?;
        info!(agent_id = %key.agent_id, key_id = %key.key_id, "Agent key registered");
        state.insert(key);
        Ok(())
    }

    async fn rotate(
        &self,
        agent_id: &str,
        new_key: AgentKey,
        at: DateTime<Utc>,
    ) -> SigningResult<AgentKey> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| SigningError::Backend("key registry lock poisoned".into()))?;

        let keys = state
            .by_agent
            .get(agent_id)
            .ok_or_else(|| SigningError::NoActiveKey {
                agent_id: agent_id.to_owned(),
            })?;
        let open_index = keys
            .iter()
            .position(AgentKey::is_open)
            .ok_or_else(|| SigningError::NoActiveKey {
                agent_id: agent_id.to_owned(),
            })?;
        check_rotation(agent_id, &keys[open_index], &new_key, at)?;

        let mut closed = keys[open_index].clone();
        closed.active_until = Some(at);

        // No other window may overlap the open one, so every earlier key ends
        // before `at` and the new window cannot clash with them. Only the id
        // and key material are left to check before both changes apply.
        if state.agent_of_key.contains_key(&new_key.key_id) {
            return Err(SigningError::DuplicateKey(new_key.key_id.clone()));
        }
        new_key.verifying_key()?;
        if let Some(keys) = state.by_agent.get_mut(agent_id) {
            keys[open_index] = closed.clone();
        }
        state.insert(new_key.clone());

        info!(
            agent_id = %agent_id,
            retired_key = %closed.key_id,
            new_key = %new_key.key_id,
            at = %at,
            "Agent key rotated"
        );
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_agent_key;
    use chrono::Duration;

    #[tokio::test]
    async fn register_and_lookup_by_instant() {
        let registry = InMemoryKeyRegistry::new();
        let t0 = Utc::now() - Duration::hours(2);
        let (key, _) = generate_agent_key("archon-1", "k1", t0);
        registry.register(key.clone()).await.unwrap();

        assert_eq!(registry.active_key("archon-1").await.unwrap(), Some(key.clone()));
        assert_eq!(
            registry.key_active_at("archon-1", t0 - Duration::seconds(1)).await.unwrap(),
            None
        );
        assert!(registry.active_key("archon-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotation_closes_previous_window() {
        let registry = InMemoryKeyRegistry::new();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = t0 + Duration::hours(1);
        let (k1, _) = generate_agent_key("archon-1", "k1", t0);
        let (k2, _) = generate_agent_key("archon-1", "k2", t1);
        registry.register(k1).await.unwrap();

        let closed = registry.rotate("archon-1", k2.clone(), t1).await.unwrap();
        assert_eq!(closed.active_until, Some(t1));

        let keys = registry.keys_for("archon-1").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(
            registry.key_active_at("archon-1", t0).await.unwrap().unwrap().key_id,
            "k1"
        );
        assert_eq!(
            registry.key_active_at("archon-1", t1).await.unwrap().unwrap().key_id,
            "k2"
        );
        assert_eq!(registry.active_key("archon-1").await.unwrap(), Some(k2));
    }

    #[tokio::test]
    async fn rotation_to_reused_or_malformed_key_changes_nothing() {
        let registry = InMemoryKeyRegistry::new();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = t0 + Duration::hours(1);
        let (k1, _) = generate_agent_key("archon-1", "k1", t0);
        registry.register(k1.clone()).await.unwrap();

        let (reused, _) = generate_agent_key("archon-1", "k1", t1);
        assert_eq!(
            registry.rotate("archon-1", reused, t1).await.unwrap_err(),
            SigningError::DuplicateKey("k1".into())
        );

        let (mut malformed, _) = generate_agent_key("archon-1", "k2", t1);
        malformed.public_key = "zz".into();
        assert!(matches!(
            registry.rotate("archon-1", malformed, t1).await.unwrap_err(),
            SigningError::InvalidKeyMaterial(_)
        ));

        assert_eq!(registry.keys_for("archon-1").await.unwrap(), vec![k1.clone()]);
        assert_eq!(registry.active_key("archon-1").await.unwrap(), Some(k1));
    }

    #[tokio::test]
    async fn rotation_before_current_start_is_rejected() {
        let registry = InMemoryKeyRegistry::new();
        let t0 = Utc::now();
        let (k1, _) = generate_agent_key("archon-1", "k1", t0);
        registry.register(k1).await.unwrap();

        let early = t0 - Duration::minutes(1);
        let (k2, _) = generate_agent_key("archon-1", "k2", early);
        let err = registry.rotate("archon-1", k2, early).await.unwrap_err();
        assert!(matches!(err, SigningError::InvalidKeyWindow(_)));
        assert_eq!(registry.keys_for("archon-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_registration_is_rejected() {
        let registry = InMemoryKeyRegistry::new();
        let t0 = Utc::now();
        let (k1, _) = generate_agent_key("archon-1", "k1", t0);
        let (k2, _) = generate_agent_key("archon-1", "k2", t0 + Duration::hours(1));
        registry.register(k1).await.unwrap();

        let err = registry.register(k2).await.unwrap_err();
        assert!(matches!(err, SigningError::InvalidKeyWindow(_)));
    }

    #[tokio::test]
    async fn duplicate_key_id_is_rejected() {
        let registry = InMemoryKeyRegistry::new();
        let (k1, _) = generate_agent_key("archon-1", "shared", Utc::now());
        let (k2, _) = generate_agent_key("archon-2", "shared", Utc::now());
        registry.register(k1).await.unwrap();
        assert_eq!(
            registry.register(k2).await.unwrap_err(),
            SigningError::DuplicateKey("shared".into())
        );
    }

    #[tokio::test]
    async fn delete_is_always_forbidden() {
        let registry = InMemoryKeyRegistry::new();
        let (k1, _) = generate_agent_key("archon-1", "k1", Utc::now());
        registry.register(k1).await.unwrap();

        assert_eq!(
            registry.delete("k1").await.unwrap_err(),
            SigningError::KeyDeletionForbidden { key_id: "k1".into() }
        );
        assert_eq!(registry.keys_for("archon-1").await.unwrap().len(), 1);
    }
}
