use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::IntegrityError;
use crate::scan::{HashScanResult, ScanScope};
use crate::verifier::HashVerifier;

/// Point-in-time view of continuous verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub last_scan_id: Option<Uuid>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub next_scan_at: Option<DateTime<Utc>>,
    pub passed: Option<bool>,
    pub halted: bool,
}

impl VerificationStatus {
    pub fn from_latest(
        latest: Option<&HashScanResult>,
        next_scan_at: Option<DateTime<Utc>>,
        halted: bool,
    ) -> Self {
        Self {
            last_scan_id: latest.map(|r| r.scan_id),
            last_scan_at: latest.map(|r| r.finished_at),
            next_scan_at,
            passed: latest.map(HashScanResult::passed),
            halted,
        }
    }
}

/// Shared slot holding the next scheduled scan instant.
#[derive(Clone, Debug, Default)]
pub struct ScanSchedule {
    next: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl ScanSchedule {
    pub fn next_scan_at(&self) -> Option<DateTime<Utc>> {
        self.next.read().ok().and_then(|slot| *slot)
    }

    fn set(&self, at: Option<DateTime<Utc>>) {
        if let Ok(mut slot) = self.next.write() {
            *slot = at;
        }
    }
}

/// Shortest accepted scan interval.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a hash scan on a fixed interval until shut down or halted.
pub struct ContinuousVerifier {
    verifier: Arc<HashVerifier>,
    interval: Duration,
    scope: ScanScope,
    schedule: ScanSchedule,
}

impl ContinuousVerifier {
    /// `interval` is raised to [`MIN_SCAN_INTERVAL`] if shorter.
    pub fn new(verifier: Arc<HashVerifier>, interval: Duration) -> Self {
        Self {
            verifier,
            interval: interval.max(MIN_SCAN_INTERVAL),
            scope: ScanScope::Full,
            schedule: ScanSchedule::default(),
        }
    }

    pub fn with_scope(mut self, scope: ScanScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn schedule(&self) -> ScanSchedule {
        self.schedule.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the loop on the current runtime. The first scan runs immediately.
    pub fn spawn(self) -> VerifierHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let schedule = self.schedule.clone();
        let task = tokio::spawn(self.run(shutdown_rx));
        VerifierHandle {
            shutdown: shutdown_tx,
            task,
            schedule,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let interval =
            chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero());

        info!(interval_ms = self.interval.as_millis() as u64, scope = ?self.scope, "Continuous verification started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if self.verifier.halt().is_halted() {
                warn!("System halted, continuous verification stopping");
                break;
            }

            self.schedule.set(Some(Utc::now() + interval));

            match self.verifier.run(self.scope, Some(&shutdown)).await {
                Ok(result) if result.passed() => {}
                Ok(result) => {
                    error!(
                        scan_id = %result.scan_id,
                        failed_sequence = ?result.failed_sequence,
                        "Scan failed, continuous verification stopping"
                    );
                    break;
                }
                Err(IntegrityError::ScanCancelled) => break,
                Err(e) => {
                    error!(error = %e, "Scan could not complete");
                }
            }
        }

        self.schedule.set(None);
        info!("Continuous verification stopped");
    }
}

/// Owner handle for a running [`ContinuousVerifier`].
pub struct VerifierHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    schedule: ScanSchedule,
}

impl VerifierHandle {
    pub fn next_scan_at(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_scan_at()
    }

    pub fn schedule(&self) -> ScanSchedule {
        self.schedule.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for it to exit. An in-flight scan is
    /// cancelled at its next page boundary.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Continuous verification task failed");
        }
    }
}
