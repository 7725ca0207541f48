use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ledger_types::{Event, GENESIS_PREV_HASH};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ChainHead, EventReader, EventWriter};

/// In-memory event store used for tests, local runs and embedding.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    events: Vec<Event>,
    id_index: HashMap<Uuid, usize>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a previously persisted chain as-is, e.g. from an export file.
    ///
    /// Nothing is checked here; run a hash scan over the result before
    /// trusting it.
    pub fn load_unverified(events: Vec<Event>) -> Self {
        let id_index = events
            .iter()
            .enumerate()
            .map(|(index, event)| (event.event_id(), index))
            .collect();
        Self {
            inner: RwLock::new(StoreState { events, id_index }),
        }
    }

    fn read_state(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("event store read lock poisoned".into()))
    }
}

fn head_of(state: &StoreState) -> Option<ChainHead> {
    state.events.last().map(ChainHead::of)
}

#[async_trait]
impl EventReader for InMemoryEventStore {
    async fn head(&self) -> StoreResult<Option<ChainHead>> {
        Ok(head_of(&*self.read_state()?))
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.read_state()?.events.len() as u64)
    }

    async fn get(&self, sequence_number: u64) -> StoreResult<Option<Event>> {
        if sequence_number == 0 {
            return Ok(None);
        }
        let state = self.read_state()?;
        Ok(state.events.get((sequence_number - 1) as usize).cloned())
    }

    async fn get_by_id(&self, event_id: Uuid) -> StoreResult<Option<Event>> {
        let state = self.read_state()?;
        Ok(state
            .id_index
            .get(&event_id)
            .and_then(|index| state.events.get(*index))
            .cloned())
    }

    async fn read_range(&self, from_seq: u64, to_seq: u64) -> StoreResult<Vec<Event>> {
        if from_seq == 0 || to_seq == 0 || from_seq > to_seq {
            return Err(StoreError::InvalidRange {
                from: from_seq,
                to: to_seq,
            });
        }

        let state = self.read_state()?;
        let start = (from_seq - 1) as usize;
        if start >= state.events.len() {
            return Ok(vec![]);
        }
        let end_exclusive = to_seq.min(state.events.len() as u64) as usize;
        Ok(state.events[start..end_exclusive].to_vec())
    }

    async fn read_all(&self) -> StoreResult<Vec<Event>> {
        Ok(self.read_state()?.events.clone())
    }
}

#[async_trait]
impl EventWriter for InMemoryEventStore {
    async fn append(
        &self,
        event: Event,
        expected_head: Option<&ChainHead>,
    ) -> StoreResult<ChainHead> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("event store write lock poisoned".into()))?;

        let actual_head = head_of(&state);
        if actual_head.as_ref() != expected_head {
            return Err(StoreError::HeadMismatch {
                expected: expected_head.map(|h| h.sequence_number),
                actual: actual_head.map(|h| h.sequence_number),
            });
        }

        let expected_seq = ChainHead::next_sequence(expected_head);
        if event.sequence_number() != expected_seq {
            return Err(StoreError::SequenceMismatch {
                expected: expected_seq,
                actual: event.sequence_number(),
            });
        }

        let expected_prev = expected_head
            .map(|h| h.content_hash.as_str())
            .unwrap_or(GENESIS_PREV_HASH);
        if event.prev_hash() != expected_prev {
            return Err(StoreError::PrevHashMismatch {
                expected: expected_prev.to_owned(),
                actual: event.prev_hash().to_owned(),
            });
        }

        if state.id_index.contains_key(&event.event_id()) {
            return Err(StoreError::DuplicateEvent(event.event_id().to_string()));
        }

        let head = ChainHead::of(&event);
        let index = state.events.len();
        state.id_index.insert(event.event_id(), index);
        state.events.push(event);

        debug!(sequence = head.sequence_number, "Event appended to in-memory store");
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_types::{EventSignature, ProposedEvent, SignatureAlgorithm};
    use serde_json::json;

    fn signature() -> EventSignature {
        EventSignature {
            signature: "00".repeat(64),
            signing_key_id: "key-test".into(),
            sig_alg_version: SignatureAlgorithm::CURRENT.version(),
            signed_at: Utc::now(),
        }
    }

    fn next_event(store_head: Option<&ChainHead>, n: i64) -> Event {
        let prev = store_head
            .map(|h| h.content_hash.clone())
            .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
        Event::seal(
            ChainHead::next_sequence(store_head),
            ProposedEvent::new("vote.cast", "archon-1", json!({ "n": n }), prev),
            signature(),
        )
    }

    #[tokio::test]
    async fn appends_build_a_gapless_chain() {
        let store = InMemoryEventStore::new();
        let mut head = None;
        for n in 0..5 {
            let event = next_event(head.as_ref(), n);
            head = Some(store.append(event, head.as_ref()).await.unwrap());
        }

        let events = store.read_all().await.unwrap();
        assert_eq!(events.len(), 5);
        assert!(events[0].links_to(None));
        for pair in events.windows(2) {
            assert!(pair[1].links_to(Some(&pair[0])));
        }
        assert_eq!(store.head().await.unwrap(), head);
    }

    #[tokio::test]
    async fn stale_expected_head_is_rejected_without_write() {
        let store = InMemoryEventStore::new();
        let first = next_event(None, 1);
        let head = store.append(first, None).await.unwrap();

        // A writer still believing the ledger is empty.
        let racing = next_event(None, 2);
        let err = store.append(racing, None).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::HeadMismatch {
                expected: None,
                actual: Some(1)
            }
        );
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.head().await.unwrap(), Some(head));
    }

    #[tokio::test]
    async fn wrong_prev_hash_is_rejected() {
        let store = InMemoryEventStore::new();
        let head = store.append(next_event(None, 1), None).await.unwrap();

        let bad = Event::seal(
            2,
            ProposedEvent::new("vote.cast", "archon-1", json!({}), "f".repeat(64)),
            signature(),
        );
        let err = store.append(bad, Some(&head)).await.unwrap_err();
        assert!(matches!(err, StoreError::PrevHashMismatch { .. }));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_sequence_is_rejected() {
        let store = InMemoryEventStore::new();
        let bad = Event::seal(
            3,
            ProposedEvent::new("vote.cast", "archon-1", json!({}), GENESIS_PREV_HASH),
            signature(),
        );
        let err = store.append(bad, None).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::SequenceMismatch {
                expected: 1,
                actual: 3
            }
        );
    }

    #[tokio::test]
    async fn read_range_is_inclusive_and_validated() {
        let store = InMemoryEventStore::new();
        let mut head = None;
        for n in 0..3 {
            let event = next_event(head.as_ref(), n);
            head = Some(store.append(event, head.as_ref()).await.unwrap());
        }

        assert_eq!(store.read_range(2, 3).await.unwrap().len(), 2);
        assert_eq!(store.read_range(2, 10).await.unwrap().len(), 2);
        assert!(store.read_range(4, 9).await.unwrap().is_empty());
        assert_eq!(
            store.read_range(3, 2).await.unwrap_err(),
            StoreError::InvalidRange { from: 3, to: 2 }
        );
    }

    #[tokio::test]
    async fn lookup_by_sequence_and_id() {
        let store = InMemoryEventStore::new();
        let event = next_event(None, 1);
        let id = event.event_id();
        store.append(event, None).await.unwrap();

        assert!(store.get(0).await.unwrap().is_none());
        assert_eq!(store.get(1).await.unwrap().unwrap().event_id(), id);
        assert_eq!(store.get_by_id(id).await.unwrap().unwrap().sequence_number(), 1);
        assert!(store.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn id_index_tracks_every_appended_position() {
        let store = InMemoryEventStore::new();
        let mut head = None;
        let mut ids = Vec::new();
        for n in 0..4 {
            let event = next_event(head.as_ref(), n);
            ids.push(event.event_id());
            head = Some(store.append(event, head.as_ref()).await.unwrap());
        }

        for (index, id) in ids.into_iter().enumerate() {
            let found = store.get_by_id(id).await.unwrap().unwrap();
            assert_eq!(found.sequence_number(), index as u64 + 1);
        }
    }

    #[tokio::test]
    async fn load_unverified_keeps_events_verbatim() {
        let event = next_event(None, 1);
        let mut parts = event.into_parts();
        parts.content_hash = "f".repeat(64);
        let forged = Event::from_parts(parts);

        let store = InMemoryEventStore::load_unverified(vec![forged.clone()]);
        assert_eq!(store.read_all().await.unwrap(), vec![forged]);
    }
}
