//! Privileged chain rebuild from previously exported events.
//!
//! Replayed events keep their original signatures and skip write-time
//! validation. Each one must still recompute its content hash and link to
//! the head it is appended after. Aggregate state follows every replayed
//! event, so the rebuilt ledger enforces the lifecycle the original did.

use std::sync::Arc;

use ledger_gate::InMemoryStateProjection;
use ledger_store::EventStore;
use ledger_types::{Event, EventTypeRegistry, HaltState};
use tracing::info;

use crate::error::{LedgerServiceError, LedgerServiceResult};
use crate::export::CompleteExport;
use crate::ledger::ConstitutionalLedger;

pub struct ReplayWriter {
    store: Arc<dyn EventStore>,
    registry: Arc<EventTypeRegistry>,
    states: Arc<InMemoryStateProjection>,
    halt: Arc<HaltState>,
}

impl ReplayWriter {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: Arc<EventTypeRegistry>,
        states: Arc<InMemoryStateProjection>,
        halt: Arc<HaltState>,
    ) -> Self {
        Self {
            store,
            registry,
            states,
            halt,
        }
    }

    /// Append `events` in order. Returns the number written.
    pub async fn replay(&self, events: Vec<Event>) -> LedgerServiceResult<u64> {
        let mut written = 0u64;
        for event in events {
            self.halt.check()?;
            if !event.content_hash_matches() {
                return Err(LedgerServiceError::ReplayRejected {
                    sequence: event.sequence_number(),
                    reason: "content hash does not recompute".into(),
                });
            }
            let head = self.store.head().await?;
            self.store.append(event.clone(), head.as_ref()).await?;
            self.states.advance(&self.registry, &event)?;
            written += 1;
        }
        info!(events = written, "Replay complete");
        Ok(written)
    }

    /// Rebuild from a complete export, refusing incomplete ones.
    pub async fn replay_export(&self, export: CompleteExport) -> LedgerServiceResult<u64> {
        if !export.validate_completeness() {
            return Err(LedgerServiceError::ReplayRejected {
                sequence: 0,
                reason: "export is not complete".into(),
            });
        }
        self.replay(export.events).await
    }
}

impl ConstitutionalLedger {
    pub fn replay_writer(&self) -> ReplayWriter {
        ReplayWriter::new(
            self.store().clone(),
            self.registry().clone(),
            self.states().clone(),
            self.halt().clone(),
        )
    }
}
