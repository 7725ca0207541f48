use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IntegrityError, IntegrityResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashScanStatus {
    Passed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanScope {
    Full,
    Window { last_n: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashScanResult {
    pub scan_id: Uuid,
    pub scope: ScanScope,
    /// Inclusive scanned range; `None` for an empty ledger.
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub events_scanned: u64,
    pub status: HashScanStatus,
    pub failed_sequence: Option<u64>,
    pub failed_event_id: Option<Uuid>,
    pub breach_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl HashScanResult {
    pub fn passed(&self) -> bool {
        self.status == HashScanStatus::Passed
    }
}

/// History of completed scans.
#[async_trait]
pub trait ScanRecordStore: Send + Sync {
    async fn record(&self, result: &HashScanResult) -> IntegrityResult<()>;
    async fn latest(&self) -> IntegrityResult<Option<HashScanResult>>;
    async fn list(&self) -> IntegrityResult<Vec<HashScanResult>>;
}

#[derive(Default)]
pub struct InMemoryScanRecordStore {
    results: RwLock<Vec<HashScanResult>>,
}

impl InMemoryScanRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanRecordStore for InMemoryScanRecordStore {
    async fn record(&self, result: &HashScanResult) -> IntegrityResult<()> {
        self.results
            .write()
            .map_err(|_| IntegrityError::Backend("scan record lock poisoned".into()))?
            .push(result.clone());
        Ok(())
    }

    async fn latest(&self) -> IntegrityResult<Option<HashScanResult>> {
        Ok(self
            .results
            .read()
            .map_err(|_| IntegrityError::Backend("scan record lock poisoned".into()))?
            .last()
            .cloned())
    }

    async fn list(&self) -> IntegrityResult<Vec<HashScanResult>> {
        Ok(self
            .results
            .read()
            .map_err(|_| IntegrityError::Backend("scan record lock poisoned".into()))?
            .clone())
    }
}
