use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use ledger_gate::{InMemoryStateProjection, TransitionTable, ValidationPipeline};
use ledger_integrity::{
    BreachKind, BreachLog, BreachRecord, ContinuousVerifier, HashScanResult, HashVerifier,
    InMemoryBreachLog, InMemoryScanRecordStore, ScanRecordStore, ScanSchedule, ScanScope,
    VerificationStatus, VerifierHandle,
};
use ledger_signing::{InMemoryKeyRegistry, KeyRegistry, KeySource, SigningService};
use ledger_store::{ChainHead, EventReader, EventStore, InMemoryEventStore};
use ledger_types::{
    expected_prev_hash, Event, EventTypeRegistry, HaltState, HaltStatus, ProposedEvent,
};
use ledger_witness::{
    AttestationStore, BreachObservation, CollusionDefense, EntropySource,
    InMemoryAttestationStore, InMemoryInvestigationStore, Investigation, InvestigationStore,
    OsEntropySource, ResolutionOutcome, WitnessAttestation, WitnessSelector,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actors::KeyRegistryActors;
use crate::bridge::WitnessBreachReporter;
use crate::config::LedgerConfig;
use crate::error::{LedgerServiceError, LedgerServiceResult};
use crate::export::CompleteExport;

/// Event type recorded when an investigation is resolved.
pub const INVESTIGATION_RESOLVED: &str = "witness.investigation_resolved";

/// Backends a ledger is assembled from.
pub struct LedgerParts {
    store: Arc<dyn EventStore>,
    reader: Arc<dyn EventReader>,
    pub keys: Arc<dyn KeyRegistry>,
    pub key_source: Arc<dyn KeySource>,
    pub investigations: Arc<dyn InvestigationStore>,
    pub attestations: Arc<dyn AttestationStore>,
    pub entropy: Arc<dyn EntropySource>,
    pub scans: Arc<dyn ScanRecordStore>,
    pub breaches: Arc<dyn BreachLog>,
}

impl LedgerParts {
    /// Everything in memory; private keys come from `key_source`.
    pub fn in_memory(key_source: Arc<dyn KeySource>) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        Self {
            store: store.clone(),
            reader: store,
            keys: Arc::new(InMemoryKeyRegistry::new()),
            key_source,
            investigations: Arc::new(InMemoryInvestigationStore::new()),
            attestations: Arc::new(InMemoryAttestationStore::new()),
            entropy: Arc::new(OsEntropySource),
            scans: Arc::new(InMemoryScanRecordStore::new()),
            breaches: Arc::new(InMemoryBreachLog::new()),
        }
    }

    pub fn with_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: EventStore + 'static,
    {
        self.store = store.clone();
        self.reader = store;
        self
    }

    pub fn with_keys(mut self, keys: Arc<dyn KeyRegistry>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_investigations(mut self, investigations: Arc<dyn InvestigationStore>) -> Self {
        self.investigations = investigations;
        self
    }

    pub fn with_attestations(mut self, attestations: Arc<dyn AttestationStore>) -> Self {
        self.attestations = attestations;
        self
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn with_scans(mut self, scans: Arc<dyn ScanRecordStore>) -> Self {
        self.scans = scans;
        self
    }

    pub fn with_breaches(mut self, breaches: Arc<dyn BreachLog>) -> Self {
        self.breaches = breaches;
        self
    }
}

/// The constitutional event ledger.
///
/// Every append runs halt check, validation, signing and witness selection
/// against the head read at the start, then commits with a compare-and-swap
/// on that same head. A concurrent writer makes the append fail with
/// `HeadMismatch`; nothing is retried.
pub struct ConstitutionalLedger {
    store: Arc<dyn EventStore>,
    registry: Arc<EventTypeRegistry>,
    pipeline: ValidationPipeline,
    signing: SigningService,
    selector: WitnessSelector,
    defense: Arc<CollusionDefense>,
    attestations: Arc<dyn AttestationStore>,
    states: Arc<InMemoryStateProjection>,
    verifier: Arc<HashVerifier>,
    schedule: RwLock<Option<ScanSchedule>>,
    halt: Arc<HaltState>,
}

impl ConstitutionalLedger {
    /// Wire `parts` together and fold the stored chain into the state
    /// projection, so a ledger reopened over existing events enforces the
    /// same lifecycle it did before.
    pub async fn assemble(
        parts: LedgerParts,
        config: &LedgerConfig,
        halt: Arc<HaltState>,
    ) -> LedgerServiceResult<Self> {
        config.validate().map_err(LedgerServiceError::Config)?;

        let registry = Arc::new(EventTypeRegistry::constitutional());
        let states = Arc::new(InMemoryStateProjection::new());
        let pipeline = ValidationPipeline::standard(
            registry.clone(),
            Arc::new(TransitionTable::constitutional()),
            Arc::new(KeyRegistryActors::new(parts.keys.clone())),
            states.clone(),
            halt.clone(),
            &config.gate.to_gate_config(),
        );
        let signing = SigningService::new(parts.keys, parts.key_source, halt.clone());

        let defense = Arc::new(
            CollusionDefense::load(config.collusion.clone(), parts.investigations, halt.clone())
                .await?,
        );
        let selector = WitnessSelector::new(
            config.witness.pool.clone(),
            config.witness.witnesses_per_event,
            parts.entropy,
            defense.clone(),
            halt.clone(),
        )?;
        let attestations = parts.attestations;

        let verifier = HashVerifier::new(parts.reader, parts.scans, parts.breaches, halt.clone())
            .with_page_size(config.verification.page_size)
            .with_listener(Arc::new(WitnessBreachReporter::new(
                attestations.clone(),
                defense.clone(),
            )));

        let ledger = Self {
            store: parts.store,
            registry,
            pipeline,
            signing,
            selector,
            defense,
            attestations,
            states,
            verifier: Arc::new(verifier),
            schedule: RwLock::new(None),
            halt,
        };
        ledger.rebuild_state(config.verification.page_size).await?;
        Ok(ledger)
    }

    async fn rebuild_state(&self, page_size: u64) -> LedgerServiceResult<()> {
        let Some(head) = self.store.head().await? else {
            return Ok(());
        };
        let page_size = page_size.max(1);
        let mut applied = 0u64;
        let mut from = 1u64;
        while from <= head.sequence_number {
            let to = head.sequence_number.min(from + page_size - 1);
            for event in self.store.read_range(from, to).await? {
                if self.states.advance(&self.registry, &event)? {
                    applied += 1;
                }
            }
            from = to + 1;
        }
        info!(
            events = head.sequence_number,
            transitions = applied,
            aggregates = self.states.len(),
            "State projection rebuilt from stored chain"
        );
        Ok(())
    }

    pub fn halt(&self) -> &Arc<HaltState> {
        &self.halt
    }

    pub fn halt_status(&self) -> HaltStatus {
        self.halt.status()
    }

    pub fn signing(&self) -> &SigningService {
        &self.signing
    }

    pub fn key_registry(&self) -> &Arc<dyn KeyRegistry> {
        self.signing.registry()
    }

    pub fn defense(&self) -> &Arc<CollusionDefense> {
        &self.defense
    }

    pub fn verifier(&self) -> &Arc<HashVerifier> {
        &self.verifier
    }

    #[cfg(feature = "replay-tooling")]
    pub(crate) fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    #[cfg(feature = "replay-tooling")]
    pub(crate) fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    #[cfg(feature = "replay-tooling")]
    pub(crate) fn states(&self) -> &Arc<InMemoryStateProjection> {
        &self.states
    }

    /// Append a new event linked to the current head.
    pub async fn append_event(
        &self,
        payload: Value,
        event_type: &str,
        actor_id: &str,
    ) -> LedgerServiceResult<Event> {
        self.halt.check()?;
        let head = self.store.head().await?;
        let prev_hash = expected_prev_hash(head.as_ref().map(|h| h.content_hash.as_str()));
        let proposal = ProposedEvent::new(event_type, actor_id, payload, prev_hash);
        self.commit(proposal, head, false).await
    }

    /// Append an event the ledger records on its own behalf. Reserved event
    /// types are only accepted here.
    async fn append_internal(
        &self,
        payload: Value,
        event_type: &str,
        actor_id: &str,
    ) -> LedgerServiceResult<Event> {
        self.halt.check()?;
        let head = self.store.head().await?;
        let prev_hash = expected_prev_hash(head.as_ref().map(|h| h.content_hash.as_str()));
        let proposal = ProposedEvent::new(event_type, actor_id, payload, prev_hash);
        self.commit(proposal, head, true).await
    }

    /// Append a caller-built proposal. Its claimed hashes are checked, not
    /// trusted.
    pub async fn submit(&self, proposal: ProposedEvent) -> LedgerServiceResult<Event> {
        self.halt.check()?;
        let head = self.store.head().await?;
        self.commit(proposal, head, false).await
    }

    async fn commit(
        &self,
        proposal: ProposedEvent,
        head: Option<ChainHead>,
        internal: bool,
    ) -> LedgerServiceResult<Event> {
        if internal {
            self.pipeline.validate_internal(&proposal, head.as_ref()).await?;
        } else {
            self.pipeline.validate(&proposal, head.as_ref()).await?;
        }

        let signature = self
            .signing
            .sign(&proposal.content_hash, &proposal.prev_hash, &proposal.actor_id)
            .await?;

        let sequence = ChainHead::next_sequence(head.as_ref());
        let selection = self.selector.select(&proposal.prev_hash, sequence).await?;

        let event = Event::seal(sequence, proposal, signature);

        self.halt.check()?;
        let new_head = self.store.append(event.clone(), head.as_ref()).await?;

        self.attestations
            .record(&WitnessAttestation {
                sequence_number: new_head.sequence_number,
                witnesses: selection.witnesses.clone(),
                seed: selection.seed,
                recorded_at: Utc::now(),
            })
            .await?;
        self.advance_state(&event);

        info!(
            sequence = new_head.sequence_number,
            event_type = %event.event_type(),
            actor_id = %event.actor_id(),
            content_hash = %new_head.content_hash,
            witnesses = ?selection.witnesses,
            "Event appended"
        );
        Ok(event)
    }

    fn advance_state(&self, event: &Event) {
        match self.states.advance(&self.registry, event) {
            Ok(true) => debug!(sequence = event.sequence_number(), "State projection advanced"),
            Ok(false) => {}
            Err(e) => error!(
                sequence = event.sequence_number(),
                error = %e,
                "State projection not advanced"
            ),
        }
    }

    /// Check one stored event: content hash, link to its predecessor and
    /// signature under the key active when it was created.
    pub async fn verify(&self, sequence: u64) -> LedgerServiceResult<bool> {
        let event = self
            .store
            .get(sequence)
            .await?
            .ok_or(LedgerServiceError::EventNotFound(sequence))?;

        if !event.content_hash_matches() {
            warn!(sequence = sequence, "Content hash does not recompute");
            return Ok(false);
        }

        let previous = match sequence {
            1 => None,
            n => self.store.get(n - 1).await?,
        };
        if !event.links_to(previous.as_ref()) {
            warn!(sequence = sequence, "Event does not link to its predecessor");
            return Ok(false);
        }

        match self.signing.verify(&event).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_verification_failure() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The whole chain, genesis to head, in one read.
    pub async fn export_complete(&self) -> LedgerServiceResult<CompleteExport> {
        let events = self.store.read_all().await?;
        let export = CompleteExport::new(events);
        info!(
            export_id = %export.metadata.export_id,
            total_events = export.metadata.total_events,
            chain_valid = export.verification.chain_valid,
            "Ledger exported"
        );
        Ok(export)
    }

    pub async fn full_chain_scan(&self) -> LedgerServiceResult<HashScanResult> {
        Ok(self.verifier.full_chain_scan().await?)
    }

    pub async fn scan_window(&self, last_n: u64) -> LedgerServiceResult<HashScanResult> {
        Ok(self.verifier.scan_window(last_n).await?)
    }

    /// Start scheduled scans. Only the most recently started loop is
    /// reflected in [`Self::get_verification_status`]. Intervals below
    /// [`MIN_SCAN_INTERVAL`](ledger_integrity::MIN_SCAN_INTERVAL) are
    /// raised to it.
    pub fn start_verification(&self, interval: Duration, scope: ScanScope) -> VerifierHandle {
        let continuous = ContinuousVerifier::new(self.verifier.clone(), interval).with_scope(scope);
        if let Ok(mut slot) = self.schedule.write() {
            *slot = Some(continuous.schedule());
        }
        continuous.spawn()
    }

    pub async fn get_verification_status(&self) -> LedgerServiceResult<VerificationStatus> {
        let latest = self.verifier.scans().latest().await?;
        let next_scan_at = self
            .schedule
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(ScanSchedule::next_scan_at));
        Ok(VerificationStatus::from_latest(
            latest.as_ref(),
            next_scan_at,
            self.halt.is_halted(),
        ))
    }

    pub async fn breaches(&self) -> LedgerServiceResult<Vec<BreachRecord>> {
        Ok(self.verifier.breaches().list().await?)
    }

    /// Witnesses drawn for the event at `sequence`.
    pub async fn witnesses_for(&self, sequence: u64) -> LedgerServiceResult<Vec<String>> {
        Ok(self.attestations.witnesses_for(sequence).await?)
    }

    /// Record suspicious but unverified witness behaviour as evidence.
    pub async fn report_anomaly(
        &self,
        anomaly_id: &str,
        witnesses: Vec<String>,
    ) -> LedgerServiceResult<()> {
        self.defense
            .record_breach(BreachObservation::anomaly(anomaly_id, witnesses))
            .await?;
        Ok(())
    }

    pub async fn trigger_investigation(
        &self,
        pair_key: &str,
        evidence: Vec<String>,
    ) -> LedgerServiceResult<Uuid> {
        Ok(self.defense.trigger_investigation(pair_key, evidence).await?)
    }

    /// Resolve an investigation and record the resolution on the chain,
    /// signed by `resolver`. A confirmed collusion is a breach: it is logged
    /// and the system halts.
    pub async fn resolve_investigation(
        &self,
        investigation_id: Uuid,
        outcome: ResolutionOutcome,
        reason: &str,
        resolver: &str,
    ) -> LedgerServiceResult<Investigation> {
        self.halt.check()?;

        // Dry run first so a refused resolution never reaches the chain.
        let pending = self
            .defense
            .investigation(investigation_id)
            .await?
            .ok_or(ledger_witness::WitnessError::InvestigationNotFound(investigation_id))?;
        pending.resolve(outcome, reason, resolver)?;

        let event = self
            .append_internal(
                json!({
                    "investigation_id": investigation_id,
                    "pair_key": pending.pair_key(),
                    "outcome": outcome,
                    "reason": reason,
                    "resolver": resolver,
                }),
                INVESTIGATION_RESOLVED,
                resolver,
            )
            .await?;

        let resolved = self
            .defense
            .resolve_investigation(investigation_id, outcome, reason, resolver)
            .await?;

        if outcome == ResolutionOutcome::Confirmed {
            // Not tied to a chain position: the chain itself is intact.
            let mut breach = BreachRecord::new(
                BreachKind::CollusionConfirmed,
                format!(
                    "witness pair {} confirmed colluding by {resolver}: {reason}",
                    resolved.pair_key()
                ),
            );
            breach.event_id = Some(event.event_id());
            self.verifier.escalate(breach).await?;
        }

        Ok(resolved)
    }
}
