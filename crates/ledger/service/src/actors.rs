use std::sync::Arc;

use async_trait::async_trait;
use ledger_gate::{ActorProjection, ProjectionError};
use ledger_signing::KeyRegistry;

/// Actors are the agents the key ceremony has registered at least one key for.
pub struct KeyRegistryActors {
    registry: Arc<dyn KeyRegistry>,
}

impl KeyRegistryActors {
    pub fn new(registry: Arc<dyn KeyRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ActorProjection for KeyRegistryActors {
    async fn actor_exists(&self, actor_id: &str) -> Result<bool, ProjectionError> {
        self.registry
            .keys_for(actor_id)
            .await
            .map(|keys| !keys.is_empty())
            .map_err(|e| ProjectionError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_signing::{generate_agent_key, InMemoryKeyRegistry};

    #[tokio::test]
    async fn registered_agents_exist() {
        let registry = Arc::new(InMemoryKeyRegistry::new());
        let (key, _) = generate_agent_key("archon-1", "archon-1-k1", Utc::now());
        registry.register(key).await.unwrap();

        let actors = KeyRegistryActors::new(registry);
        assert!(actors.actor_exists("archon-1").await.unwrap());
        assert!(!actors.actor_exists("archon-2").await.unwrap());
    }
}
