mod support;

use std::time::Duration;

use audit_bus::{
    BusConfig, Connectivity, EventBus, EventKind, EventRecord, FileStorage, RemoteEventSink,
    SinkError, SkipReason, SyncConfig, SyncOutcome,
};
use serde_json::json;

use support::{field, field_for, wait_until_drained};

fn quick_retry() -> SyncConfig {
    SyncConfig {
        backoff_base_ms: 1_000,
        breaker_threshold: 2,
        breaker_cooldown_ms: 60_000,
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn offline_event_is_held_until_reconnect() {
    let f = field(SyncConfig::default());

    assert!(f.monitor.set_offline());
    let e1 = f.bus.emit(EventKind::ShelterOpened, json!({ "name": "Lakewood HS" }));

    assert_eq!(
        f.processor.sync_now().await,
        SyncOutcome::Skipped(SkipReason::Offline)
    );
    assert!(f.sink.is_empty());
    let queued = f.bus.queued_events();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].metadata().connectivity, Connectivity::Offline);

    assert!(f.monitor.set_online());
    assert_eq!(
        f.processor.sync_now().await,
        SyncOutcome::Delivered {
            events: 1,
            batches: 1
        }
    );
    assert_eq!(f.sink.ids(), vec![e1]);
    assert!(f.bus.queued_events().is_empty());
}

#[tokio::test]
async fn status_events_reach_listeners_but_not_the_sink() {
    let f = field(SyncConfig::default());
    let completed = f.bus.once(EventKind::SyncCompleted);

    f.monitor.set_offline();
    f.bus.emit(EventKind::ContactAdded, json!({ "name": "Lee Meyer" }));
    f.monitor.set_online();
    f.processor.sync_now().await;

    let completed = completed.await.unwrap();
    assert_eq!(completed.payload()["delivered"], 1);
    assert_eq!(
        f.sink.records().iter().map(EventRecord::kind).collect::<Vec<_>>(),
        vec![EventKind::ContactAdded]
    );
    assert!(f.bus.queued_events().is_empty());
}

#[tokio::test]
async fn follow_up_emitted_by_a_listener_reaches_the_sink_after_its_trigger() {
    let f = field(SyncConfig::default());
    let bus = f.bus.clone();
    let _follow_up = f
        .bus
        .on(EventKind::FacilityCreated, move |event| {
            bus.emit_irreversible(
                EventKind::FacilityUpdated,
                json!({ "checkedIn": event.id() }),
            );
        })
        .into_guard();

    let first = f.bus.emit(EventKind::FacilityCreated, json!({ "name": "Warehouse 7" }));
    let second = f.bus.emit(EventKind::FacilityCreated, json!({ "name": "Tampa EOC" }));
    f.processor.sync_now().await;

    let delivered = f.sink.records();
    assert_eq!(
        delivered.iter().map(EventRecord::kind).collect::<Vec<_>>(),
        vec![
            EventKind::FacilityCreated,
            EventKind::FacilityUpdated,
            EventKind::FacilityCreated,
            EventKind::FacilityUpdated,
        ]
    );
    assert_eq!(delivered[0].id(), first);
    assert_eq!(delivered[2].id(), second);
    assert!(delivered.windows(2).all(|pair| pair[0].id() < pair[1].id()));
}

#[tokio::test]
async fn redelivery_after_lost_acknowledgement_is_harmless() {
    let f = field(SyncConfig::default());
    for name in ["Pinellas", "Pasco", "Polk"] {
        f.bus.emit(EventKind::CountyAdded, json!({ "name": name }));
    }

    // The sink stored the batch but the process died before the queue was
    // cleared.
    f.sink.deliver(&f.bus.queued_events()).await.unwrap();

    let outcome = f.processor.sync_now().await;
    assert_eq!(
        outcome,
        SyncOutcome::Delivered {
            events: 3,
            batches: 1
        }
    );
    assert_eq!(f.sink.len(), 3);
    assert_eq!(f.sink.redelivered(), 3);
    assert!(f.bus.queued_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failures_back_off_then_open_the_circuit() {
    let f = field(quick_retry());
    f.bus.emit(EventKind::FacilityCreated, json!({ "name": "Tampa EOC" }));
    f.sink.set_failing(Some(SinkError::Timeout));

    assert!(matches!(
        f.processor.sync_now().await,
        SyncOutcome::Failed { delivered: 0, error: SinkError::Timeout }
    ));
    assert!(matches!(
        f.processor.sync_now().await,
        SyncOutcome::Skipped(SkipReason::Backoff { .. })
    ));

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert!(matches!(
        f.processor.sync_now().await,
        SyncOutcome::Failed { .. }
    ));
    assert!(matches!(
        f.processor.sync_now().await,
        SyncOutcome::Skipped(SkipReason::CircuitOpen { .. })
    ));
    assert_eq!(f.bus.queued_len(), 1);

    // After the cooldown a trial attempt goes through and closes the circuit.
    f.sink.set_failing(None);
    tokio::time::advance(Duration::from_millis(60_000)).await;
    assert_eq!(
        f.processor.sync_now().await,
        SyncOutcome::Delivered {
            events: 1,
            batches: 1
        }
    );
    assert!(f.bus.queued_events().is_empty());
}

#[tokio::test]
async fn events_emitted_after_a_failed_sync_are_kept_in_order() {
    let f = field(SyncConfig::default());
    let first = f.bus.emit(EventKind::OperationCreated, json!({ "name": "DR 100-25" }));
    f.sink.fail_next(1);
    assert!(matches!(
        f.processor.sync_now().await,
        SyncOutcome::Failed { .. }
    ));

    let second = f.bus.emit(EventKind::OperationUpdated, json!({ "phase": "response" }));
    assert_eq!(
        f.bus.queued_events().iter().map(EventRecord::id).collect::<Vec<_>>(),
        vec![first, second]
    );
}

#[tokio::test(start_paused = true)]
async fn background_loop_drains_after_reconnect() {
    let f = field(SyncConfig {
        interval_ms: 5_000,
        ..SyncConfig::default()
    });
    f.monitor.set_offline();
    let handle = std::sync::Arc::clone(&f.processor).spawn();

    let ids: Vec<_> = ["Citrus", "Hernando", "Sumter"]
        .iter()
        .map(|name| f.bus.emit(EventKind::CountyAdded, json!({ "name": name })))
        .collect();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(f.sink.is_empty());
    assert_eq!(f.bus.queued_len(), 3);

    f.monitor.set_online();
    handle.trigger();
    assert!(wait_until_drained(&f.bus).await);
    assert_eq!(f.sink.ids(), ids);

    let stats = handle.shutdown().await;
    assert_eq!(stats.events_delivered, 3);
    assert_eq!(stats.failures, 0);
    assert!(stats.skipped >= 1);
}

#[tokio::test]
async fn queued_events_survive_restart_and_sync_later() {
    let dir = tempfile::tempdir().unwrap();
    let config = BusConfig::default().with_actor("logistics-chief");

    let ids = {
        let (bus, load) = EventBus::builder(FileStorage::open(dir.path()).unwrap())
            .config(config.clone())
            .connectivity(Connectivity::Offline)
            .build();
        assert_eq!(load.unwrap().restored, 0);
        vec![
            bus.emit(EventKind::FacilityCreated, json!({ "name": "Warehouse 7" })),
            bus.emit(EventKind::ServiceLineUpdated, json!({ "line": "feeding" })),
        ]
    };

    let (bus, load) = EventBus::builder(FileStorage::open(dir.path()).unwrap())
        .config(config)
        .build();
    assert_eq!(load.unwrap().restored, 2);

    let f = field_for(bus, SyncConfig::default());
    f.processor.sync_now().await;
    assert_eq!(f.sink.ids(), ids);
    f.bus.flush().unwrap();

    let (reopened, load) = EventBus::builder(FileStorage::open(dir.path()).unwrap()).build();
    assert_eq!(load.unwrap().restored, 0);
    assert!(reopened.queued_events().is_empty());
}
