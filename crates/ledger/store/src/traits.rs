use async_trait::async_trait;
use ledger_types::Event;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreResult;

/// Latest appended position of the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub sequence_number: u64,
    pub content_hash: String,
}

impl ChainHead {
    pub fn of(event: &Event) -> Self {
        Self {
            sequence_number: event.sequence_number(),
            content_hash: event.content_hash().to_owned(),
        }
    }

    pub fn next_sequence(head: Option<&ChainHead>) -> u64 {
        head.map(|h| h.sequence_number + 1).unwrap_or(1)
    }
}

/// Read boundary. Reads never block writers for longer than a single copy.
#[async_trait]
pub trait EventReader: Send + Sync {
    /// Latest event position, served from a cached head rather than a scan.
    async fn head(&self) -> StoreResult<Option<ChainHead>>;

    /// Number of stored events.
    async fn count(&self) -> StoreResult<u64>;

    async fn get(&self, sequence_number: u64) -> StoreResult<Option<Event>>;

    async fn get_by_id(&self, event_id: Uuid) -> StoreResult<Option<Event>>;

    /// Inclusive range read in sequence order.
    async fn read_range(&self, from_seq: u64, to_seq: u64) -> StoreResult<Vec<Event>>;

    /// Every event, genesis first.
    async fn read_all(&self) -> StoreResult<Vec<Event>>;
}

/// Write boundary. Append is the only mutation.
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// Append `event` if and only if the current head equals `expected_head`.
    ///
    /// The event must carry sequence `expected_head + 1` (or 1) and link to the
    /// expected head's content hash (or genesis). On any mismatch nothing is
    /// written.
    async fn append(&self, event: Event, expected_head: Option<&ChainHead>)
        -> StoreResult<ChainHead>;
}

/// Full store bundle.
pub trait EventStore: EventReader + EventWriter {}

impl<T> EventStore for T where T: EventReader + EventWriter {}
