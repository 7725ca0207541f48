use std::sync::Arc;

use chrono::Utc;
use ledger_store::EventReader;
use ledger_types::{HaltState, GENESIS_PREV_HASH};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::breach::{BreachKind, BreachListener, BreachLog, BreachRecord};
use crate::error::{IntegrityError, IntegrityResult};
use crate::scan::{HashScanResult, HashScanStatus, ScanRecordStore, ScanScope};

const DEFAULT_PAGE_SIZE: u64 = 500;

/// First problem found by a scan.
struct Finding {
    kind: BreachKind,
    sequence_number: u64,
    event_id: Option<Uuid>,
    expected: String,
    actual: String,
}

/// Recomputes content hashes and chain links over stored events.
pub struct HashVerifier {
    store: Arc<dyn EventReader>,
    scans: Arc<dyn ScanRecordStore>,
    breaches: Arc<dyn BreachLog>,
    halt: Arc<HaltState>,
    page_size: u64,
    listener: Option<Arc<dyn BreachListener>>,
}

impl HashVerifier {
    pub fn new(
        store: Arc<dyn EventReader>,
        scans: Arc<dyn ScanRecordStore>,
        breaches: Arc<dyn BreachLog>,
        halt: Arc<HaltState>,
    ) -> Self {
        Self {
            store,
            scans,
            breaches,
            halt,
            page_size: DEFAULT_PAGE_SIZE,
            listener: None,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn BreachListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn scans(&self) -> &Arc<dyn ScanRecordStore> {
        &self.scans
    }

    pub fn breaches(&self) -> &Arc<dyn BreachLog> {
        &self.breaches
    }

    pub fn halt(&self) -> &Arc<HaltState> {
        &self.halt
    }

    /// Verify every event from genesis to the head.
    pub async fn full_chain_scan(&self) -> IntegrityResult<HashScanResult> {
        self.run(ScanScope::Full, None).await
    }

    /// Verify the most recent `last_n` events, linked to their predecessor.
    pub async fn scan_window(&self, last_n: u64) -> IntegrityResult<HashScanResult> {
        if last_n == 0 {
            return Err(IntegrityError::InvalidScan("window must cover at least one event".into()));
        }
        self.run(ScanScope::Window { last_n }, None).await
    }

    /// Record a breach found outside a scan and halt.
    pub async fn escalate(&self, breach: BreachRecord) -> IntegrityResult<()> {
        let recorded = self.breaches.record(&breach).await;
        self.trigger_halt(&breach);
        self.notify(&breach).await;
        recorded
    }

    pub(crate) async fn run(
        &self,
        scope: ScanScope,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> IntegrityResult<HashScanResult> {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();

        let Some(head) = self.store.head().await? else {
            let result = HashScanResult {
                scan_id,
                scope,
                first_sequence: None,
                last_sequence: None,
                events_scanned: 0,
                status: HashScanStatus::Passed,
                failed_sequence: None,
                failed_event_id: None,
                breach_id: None,
                started_at,
                finished_at: Utc::now(),
                duration_ms: 0,
            };
            self.scans.record(&result).await?;
            return Ok(result);
        };

        let last = head.sequence_number;
        let first = match scope {
            ScanScope::Full => 1,
            ScanScope::Window { last_n } if last_n >= last => 1,
            ScanScope::Window { last_n } => last - last_n + 1,
        };

        let (scanned, finding) = self.walk(first, last, cancel).await?;

        let finished_at = Utc::now();
        let mut result = HashScanResult {
            scan_id,
            scope,
            first_sequence: Some(first),
            last_sequence: Some(last),
            events_scanned: scanned,
            status: HashScanStatus::Passed,
            failed_sequence: None,
            failed_event_id: None,
            breach_id: None,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        };

        let Some(finding) = finding else {
            self.scans.record(&result).await?;
            info!(
                scan_id = %scan_id,
                first = first,
                last = last,
                duration_ms = result.duration_ms,
                "Hash scan passed"
            );
            return Ok(result);
        };

        let breach = BreachRecord::new(
            finding.kind,
            format!("{:?} at sequence {}", finding.kind, finding.sequence_number),
        )
        .at_event(finding.sequence_number, finding.event_id)
        .with_hashes(finding.expected, finding.actual)
        .in_scan(scan_id);

        result.status = HashScanStatus::Failed;
        result.failed_sequence = Some(finding.sequence_number);
        result.failed_event_id = finding.event_id;
        result.breach_id = Some(breach.breach_id);

        let breach_recorded = self.breaches.record(&breach).await;
        let scan_recorded = self.scans.record(&result).await;
        self.trigger_halt(&breach);
        self.notify(&breach).await;

        breach_recorded?;
        scan_recorded?;
        Ok(result)
    }

    /// Walk `first..=last` page by page. Returns the number of events
    /// checked and the first finding, if any.
    async fn walk(
        &self,
        first: u64,
        last: u64,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> IntegrityResult<(u64, Option<Finding>)> {
        let mut prev_hash = if first == 1 {
            GENESIS_PREV_HASH.to_owned()
        } else {
            match self.store.get(first - 1).await? {
                Some(event) => event.content_hash().to_owned(),
                None => {
                    return Ok((
                        0,
                        Some(Finding {
                            kind: BreachKind::SequenceGap,
                            sequence_number: first - 1,
                            event_id: None,
                            expected: (first - 1).to_string(),
                            actual: "missing".into(),
                        }),
                    ))
                }
            }
        };

        let mut cursor = first;
        let mut scanned = 0u64;
        while cursor <= last {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                return Err(IntegrityError::ScanCancelled);
            }

            let page_end = last.min(cursor.saturating_add(self.page_size - 1));
            let page = self.store.read_range(cursor, page_end).await?;
            debug!(from = cursor, to = page_end, events = page.len(), "Scanning page");

            for event in &page {
                if event.sequence_number() != cursor {
                    return Ok((
                        scanned,
                        Some(Finding {
                            kind: BreachKind::SequenceGap,
                            sequence_number: cursor,
                            event_id: None,
                            expected: cursor.to_string(),
                            actual: event.sequence_number().to_string(),
                        }),
                    ));
                }

                let recomputed = event.recompute_content_hash();
                if recomputed != event.content_hash() {
                    return Ok((
                        scanned,
                        Some(Finding {
                            kind: BreachKind::HashMismatch,
                            sequence_number: cursor,
                            event_id: Some(event.event_id()),
                            expected: recomputed,
                            actual: event.content_hash().to_owned(),
                        }),
                    ));
                }

                if event.prev_hash() != prev_hash {
                    return Ok((
                        scanned,
                        Some(Finding {
                            kind: BreachKind::ChainLinkBroken,
                            sequence_number: cursor,
                            event_id: Some(event.event_id()),
                            expected: prev_hash,
                            actual: event.prev_hash().to_owned(),
                        }),
                    ));
                }

                prev_hash = event.content_hash().to_owned();
                cursor += 1;
                scanned += 1;
            }

            if cursor <= page_end {
                return Ok((
                    scanned,
                    Some(Finding {
                        kind: BreachKind::SequenceGap,
                        sequence_number: cursor,
                        event_id: None,
                        expected: cursor.to_string(),
                        actual: "missing".into(),
                    }),
                ));
            }
        }

        Ok((scanned, None))
    }

    fn trigger_halt(&self, breach: &BreachRecord) {
        let reason = match breach.sequence_number {
            Some(seq) => format!("integrity breach: {:?} at sequence {seq}", breach.kind),
            None => format!("integrity breach: {:?}: {}", breach.kind, breach.detail),
        };
        error!(
            breach_id = %breach.breach_id,
            kind = ?breach.kind,
            sequence = ?breach.sequence_number,
            expected = ?breach.expected,
            actual = ?breach.actual,
            "Integrity breach detected"
        );
        self.halt.trigger(reason);
    }

    async fn notify(&self, breach: &BreachRecord) {
        if let Some(listener) = &self.listener {
            listener.on_breach(breach).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breach::InMemoryBreachLog;
    use crate::scan::InMemoryScanRecordStore;
    use async_trait::async_trait;
    use ledger_store::{ChainHead, EventWriter, InMemoryEventStore};
    use ledger_types::{Event, EventSignature, ProposedEvent, SignatureAlgorithm};
    use serde_json::json;
    use std::sync::Mutex;

    async fn chain(n: u64) -> Vec<Event> {
        let store = InMemoryEventStore::new();
        let mut head: Option<ChainHead> = None;
        for i in 1..=n {
            let prev = head
                .as_ref()
                .map(|h| h.content_hash.clone())
                .unwrap_or_else(|| GENESIS_PREV_HASH.to_owned());
            let event = Event::seal(
                i,
                ProposedEvent::new("vote.cast", "archon-1", json!({ "vote": i }), prev),
                EventSignature {
                    signature: "00".repeat(64),
                    signing_key_id: "k1".into(),
                    sig_alg_version: SignatureAlgorithm::CURRENT.version(),
                    signed_at: Utc::now(),
                },
            );
            head = Some(store.append(event, head.as_ref()).await.unwrap());
        }
        store.read_all().await.unwrap()
    }

    fn tamper_payload(events: &mut [Event], seq: u64) {
        let index = (seq - 1) as usize;
        let mut parts = events[index].clone().into_parts();
        parts.payload = json!({ "vote": "forged" });
        events[index] = Event::from_parts(parts);
    }

    struct Fixture {
        verifier: HashVerifier,
        scans: Arc<InMemoryScanRecordStore>,
        breaches: Arc<InMemoryBreachLog>,
        halt: Arc<HaltState>,
    }

    fn fixture(events: Vec<Event>, page_size: u64) -> Fixture {
        let scans = Arc::new(InMemoryScanRecordStore::new());
        let breaches = Arc::new(InMemoryBreachLog::new());
        let halt = HaltState::shared();
        let verifier = HashVerifier::new(
            Arc::new(InMemoryEventStore::load_unverified(events)),
            scans.clone(),
            breaches.clone(),
            halt.clone(),
        )
        .with_page_size(page_size);
        Fixture {
            verifier,
            scans,
            breaches,
            halt,
        }
    }

    #[tokio::test]
    async fn intact_chain_passes_and_is_recorded() {
        let f = fixture(chain(120).await, 25);
        let result = f.verifier.full_chain_scan().await.unwrap();

        assert!(result.passed());
        assert_eq!(result.events_scanned, 120);
        assert_eq!((result.first_sequence, result.last_sequence), (Some(1), Some(120)));
        assert_eq!(f.scans.latest().await.unwrap(), Some(result));
        assert!(!f.halt.is_halted());
    }

    #[tokio::test]
    async fn empty_ledger_passes() {
        let f = fixture(vec![], 10);
        let result = f.verifier.full_chain_scan().await.unwrap();
        assert!(result.passed());
        assert_eq!(result.events_scanned, 0);
        assert_eq!(result.first_sequence, None);
    }

    #[tokio::test]
    async fn tampered_event_halts_with_breach_at_that_sequence() {
        let mut events = chain(80).await;
        tamper_payload(&mut events, 50);
        let f = fixture(events, 16);

        let result = f.verifier.full_chain_scan().await.unwrap();
        assert_eq!(result.status, HashScanStatus::Failed);
        assert_eq!(result.failed_sequence, Some(50));
        assert_eq!(result.events_scanned, 49);

        let breaches = f.breaches.list().await.unwrap();
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].kind, BreachKind::HashMismatch);
        assert_eq!(breaches[0].sequence_number, Some(50));
        assert_eq!(breaches[0].scan_id, Some(result.scan_id));
        assert!(f.halt.is_halted());
        assert_eq!(f.scans.latest().await.unwrap().unwrap().status, HashScanStatus::Failed);
    }

    #[tokio::test]
    async fn relinked_forgery_is_a_broken_link() {
        // Forge event 10 with a self-consistent hash; event 11 no longer links.
        let mut events = chain(20).await;
        let mut parts = events[9].clone().into_parts();
        parts.payload = json!({ "vote": "forged" });
        parts.content_hash =
            ledger_types::compute_content_hash(&parts.event_type, &parts.payload, &parts.prev_hash);
        events[9] = Event::from_parts(parts);
        let f = fixture(events, 100);

        let result = f.verifier.full_chain_scan().await.unwrap();
        assert_eq!(result.failed_sequence, Some(11));
        let breach = &f.breaches.list().await.unwrap()[0];
        assert_eq!(breach.kind, BreachKind::ChainLinkBroken);
    }

    #[tokio::test]
    async fn missing_event_is_a_sequence_gap() {
        let mut events = chain(10).await;
        events.remove(4);
        let f = fixture(events, 3);
        let result = f.verifier.full_chain_scan().await.unwrap();
        assert_eq!(result.failed_sequence, Some(5));
        assert_eq!(f.breaches.list().await.unwrap()[0].kind, BreachKind::SequenceGap);
    }

    #[tokio::test]
    async fn window_scan_covers_only_recent_events() {
        let mut events = chain(30).await;
        tamper_payload(&mut events, 3);
        let f = fixture(events, 8);

        let result = f.verifier.scan_window(10).await.unwrap();
        assert!(result.passed());
        assert_eq!(result.first_sequence, Some(21));
        assert_eq!(result.events_scanned, 10);

        let wide = f.verifier.scan_window(1_000).await.unwrap();
        assert_eq!(wide.failed_sequence, Some(3));
    }

    #[tokio::test]
    async fn zero_window_is_rejected() {
        let f = fixture(chain(3).await, 8);
        assert!(matches!(
            f.verifier.scan_window(0).await,
            Err(IntegrityError::InvalidScan(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_scan_writes_nothing() {
        let f = fixture(chain(10).await, 2);
        let (tx, rx) = watch::channel(true);
        let err = f.verifier.run(ScanScope::Full, Some(&rx)).await.unwrap_err();
        assert_eq!(err, IntegrityError::ScanCancelled);
        assert!(f.scans.list().await.unwrap().is_empty());
        drop(tx);
    }

    struct Recorder(Mutex<Vec<BreachRecord>>);

    #[async_trait]
    impl BreachListener for Recorder {
        async fn on_breach(&self, breach: &BreachRecord) {
            self.0.lock().unwrap().push(breach.clone());
        }
    }

    #[tokio::test]
    async fn escalation_records_halts_and_notifies() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let f = fixture(vec![], 10);
        let verifier = f.verifier.with_listener(recorder.clone());

        verifier
            .escalate(BreachRecord::new(
                BreachKind::CollusionConfirmed,
                "pair w1|w2 confirmed",
            ))
            .await
            .unwrap();

        assert!(f.halt.is_halted());
        assert_eq!(f.breaches.list().await.unwrap().len(), 1);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
