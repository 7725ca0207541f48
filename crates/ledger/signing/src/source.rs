use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;

use crate::error::{SigningError, SigningResult};

/// Supplies private signing keys. Production deployments back this with an
/// HSM or keystore outside this workspace.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn signing_key(&self, key_id: &str) -> SigningResult<Option<SigningKey>>;
}

/// Process-local key source for development and tests.
#[derive(Default)]
pub struct InMemoryKeySource {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl InMemoryKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key_id: impl Into<String>, key: SigningKey) -> SigningResult<()> {
        self.keys
            .write()
            .map_err(|_| SigningError::Backend("key source lock poisoned".into()))?
            .insert(key_id.into(), key);
        Ok(())
    }
}

#[async_trait]
impl KeySource for InMemoryKeySource {
    async fn signing_key(&self, key_id: &str) -> SigningResult<Option<SigningKey>> {
        Ok(self
            .keys
            .read()
            .map_err(|_| SigningError::Backend("key source lock poisoned".into()))?
            .get(key_id)
            .cloned())
    }
}
