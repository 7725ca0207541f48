use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IntegrityError, IntegrityResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachKind {
    /// Stored content hash differs from the recomputed one.
    HashMismatch,
    /// `prev_hash` does not match the predecessor's content hash.
    ChainLinkBroken,
    /// A sequence number is missing or out of order.
    SequenceGap,
    /// A witness pair was confirmed to have colluded.
    CollusionConfirmed,
}

impl BreachKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::HashMismatch => "hash_mismatch",
            Self::ChainLinkBroken => "chain_link_broken",
            Self::SequenceGap => "sequence_gap",
            Self::CollusionConfirmed => "collusion_confirmed",
        }
    }
}

/// A detected integrity violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachRecord {
    pub breach_id: Uuid,
    pub kind: BreachKind,
    pub sequence_number: Option<u64>,
    pub event_id: Option<Uuid>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub scan_id: Option<Uuid>,
    pub detail: String,
}

impl BreachRecord {
    pub fn new(kind: BreachKind, detail: impl Into<String>) -> Self {
        Self {
            breach_id: Uuid::new_v4(),
            kind,
            sequence_number: None,
            event_id: None,
            expected: None,
            actual: None,
            detected_at: Utc::now(),
            scan_id: None,
            detail: detail.into(),
        }
    }

    pub fn at_event(mut self, sequence_number: u64, event_id: Option<Uuid>) -> Self {
        self.sequence_number = Some(sequence_number);
        self.event_id = event_id;
        self
    }

    pub fn with_hashes(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    pub fn in_scan(mut self, scan_id: Uuid) -> Self {
        self.scan_id = Some(scan_id);
        self
    }
}

/// Append-only store of breach records.
#[async_trait]
pub trait BreachLog: Send + Sync {
    async fn record(&self, breach: &BreachRecord) -> IntegrityResult<()>;
    async fn list(&self) -> IntegrityResult<Vec<BreachRecord>>;
}

#[derive(Default)]
pub struct InMemoryBreachLog {
    records: RwLock<Vec<BreachRecord>>,
}

impl InMemoryBreachLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BreachLog for InMemoryBreachLog {
    async fn record(&self, breach: &BreachRecord) -> IntegrityResult<()> {
        self.records
            .write()
            .map_err(|_| IntegrityError::Backend("breach log lock poisoned".into()))?
            .push(breach.clone());
        Ok(())
    }

    async fn list(&self) -> IntegrityResult<Vec<BreachRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| IntegrityError::Backend("breach log lock poisoned".into()))?
            .clone())
    }
}

/// Notified after a breach has been recorded and the halt triggered.
#[async_trait]
pub trait BreachListener: Send + Sync {
    async fn on_breach(&self, breach: &BreachRecord);
}
