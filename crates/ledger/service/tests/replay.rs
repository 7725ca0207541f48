#![cfg(feature = "replay-tooling")]

mod common;

use std::sync::Arc;

use common::{harness, harness_with};
use ledger_service::{LedgerParts, LedgerServiceError};
use ledger_signing::InMemoryKeySource;
use ledger_types::Event;
use serde_json::json;

#[tokio::test]
async fn export_replays_into_an_empty_ledger() {
    let source = harness().await;
    for i in 0..6 {
        source
            .ledger
            .append_event(json!({ "vote": i }), "vote.cast", "archon-1")
            .await
            .unwrap();
    }
    let export = source.ledger.export_complete().await.unwrap();

    let target = harness_with(
        LedgerParts::in_memory(Arc::new(InMemoryKeySource::new()))
            .with_keys(source.ledger.key_registry().clone()),
        Some(source.keys.clone()),
    )
    .await;
    let written = target
        .ledger
        .replay_writer()
        .replay_export(export.clone())
        .await
        .unwrap();
    assert_eq!(written, 6);

    let rebuilt = target.ledger.export_complete().await.unwrap();
    assert_eq!(rebuilt.events, export.events);
    assert!(target.ledger.full_chain_scan().await.unwrap().passed());
    assert!(target.ledger.verify(6).await.unwrap());
}

#[tokio::test]
async fn tampered_events_are_not_replayed() {
    let source = harness().await;
    source
        .ledger
        .append_event(json!({ "vote": 1 }), "vote.cast", "archon-1")
        .await
        .unwrap();
    let mut events = source.ledger.export_complete().await.unwrap().events;
    let mut parts = events[0].clone().into_parts();
    parts.payload = json!({ "vote": 2 });
    events[0] = Event::from_parts(parts);

    let target = harness().await;
    let err = target.ledger.replay_writer().replay(events).await.unwrap_err();
    assert!(matches!(err, LedgerServiceError::ReplayRejected { sequence: 1, .. }));
    assert_eq!(target.ledger.export_complete().await.unwrap().metadata.total_events, 0);
}

#[tokio::test]
async fn replayed_transitions_drive_later_validation() {
    let source = harness().await;
    source
        .ledger
        .append_event(json!({ "aggregate_id": "p-1" }), "petition.submitted", "archon-1")
        .await
        .unwrap();
    let export = source.ledger.export_complete().await.unwrap();

    let target = harness_with(
        LedgerParts::in_memory(Arc::new(InMemoryKeySource::new()))
            .with_keys(source.ledger.key_registry().clone()),
        Some(source.keys.clone()),
    )
    .await;
    target
        .ledger
        .replay_writer()
        .replay_export(export)
        .await
        .unwrap();

    let err = target
        .ledger
        .append_event(json!({ "aggregate_id": "p-1" }), "petition.submitted", "archon-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerServiceError::Validation(
            ledger_gate::WriteTimeValidationError::InvalidStateTransition { .. }
        )
    ));
    target
        .ledger
        .append_event(json!({ "aggregate_id": "p-1" }), "petition.acknowledged", "archon-1")
        .await
        .unwrap();
}
