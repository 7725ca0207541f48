//! Process-wide halt gate.
//!
//! One `HaltState` is created at startup and shared by `Arc` with every
//! component that mutates the ledger. The transition is one-way: nothing in
//! this workspace can clear it. Recovery is a separate witnessed procedure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Returned by every mutating operation once the system is halted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("system halted: {reason}")]
pub struct SystemHalted {
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
}

/// Point-in-time view of the halt gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltStatus {
    pub halted: bool,
    pub reason: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct HaltRecord {
    reason: String,
    triggered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct HaltState {
    halted: AtomicBool,
    record: RwLock<Option<HaltRecord>>,
}

impl HaltState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Cheap synchronous read.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Halt the system. Returns `true` if this call performed the transition;
    /// the first reason recorded is kept.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut record = self
            .record
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if record.is_some() {
            self.halted.store(true, Ordering::SeqCst);
            return false;
        }

        let triggered_at = Utc::now();
        error!(reason = %reason, triggered_at = %triggered_at, "System halt triggered");
        *record = Some(HaltRecord {
            reason,
            triggered_at,
        });
        self.halted.store(true, Ordering::SeqCst);
        true
    }

    /// Gate for mutating calls.
    pub fn check(&self) -> Result<(), SystemHalted> {
        if !self.is_halted() {
            return Ok(());
        }
        let record = self
            .record
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Err(match record.as_ref() {
            Some(r) => SystemHalted {
                reason: r.reason.clone(),
                triggered_at: r.triggered_at,
            },
            None => SystemHalted {
                reason: "halt reason unavailable".into(),
                triggered_at: Utc::now(),
            },
        })
    }

    pub fn status(&self) -> HaltStatus {
        let record = self
            .record
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        HaltStatus {
            halted: self.is_halted(),
            reason: record.as_ref().map(|r| r.reason.clone()),
            triggered_at: record.as_ref().map(|r| r.triggered_at),
        }
    }
}
