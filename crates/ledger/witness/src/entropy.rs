use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{WitnessError, WitnessResult};

/// External randomness mixed into every witness selection seed.
#[async_trait]
pub trait EntropySource: Send + Sync {
    async fn entropy(&self) -> WitnessResult<[u8; 32]>;
}

/// Operating-system RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropySource;

#[async_trait]
impl EntropySource for OsEntropySource {
    async fn entropy(&self) -> WitnessResult<[u8; 32]> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| WitnessError::EntropyUnavailable(e.to_string()))?;
        Ok(bytes)
    }
}

/// Constant entropy, for replaying a recorded selection and for tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedEntropySource(pub [u8; 32]);

#[async_trait]
impl EntropySource for FixedEntropySource {
    async fn entropy(&self) -> WitnessResult<[u8; 32]> {
        Ok(self.0)
    }
}
