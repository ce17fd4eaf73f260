mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use audit_bus::{
    BusConfig, EmitOptions, EventBus, EventKind, EventRecord, InMemoryStorage, InverseDescriptor,
    ListenerError, Storage,
};
use serde_json::json;

use support::{CountyRoster, Recorder};

fn bus() -> EventBus {
    EventBus::in_memory(BusConfig::default().with_actor("dro-director"))
}

fn payload_names(records: &[EventRecord]) -> Vec<String> {
    records
        .iter()
        .map(|e| e.payload()["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn listeners_observe_events_in_emission_order() {
    let bus = bus();
    let recorder = Recorder::watch(&bus, &[EventKind::CountyAdded, EventKind::FacilityCreated]);

    let ids = vec![
        bus.emit(EventKind::CountyAdded, json!({ "name": "Pinellas" })),
        bus.emit(EventKind::FacilityCreated, json!({ "name": "Tampa EOC" })),
        bus.emit(EventKind::CountyAdded, json!({ "name": "Pasco" })),
        bus.emit(EventKind::CountyAdded, json!({ "name": "Hillsborough" })),
    ];

    let seen: Vec<_> = recorder.records().iter().map(EventRecord::id).collect();
    assert_eq!(seen, ids);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(
        bus.queued_events().iter().map(EventRecord::id).collect::<Vec<_>>(),
        ids
    );
}

#[test]
fn unsubscribed_handler_receives_nothing_further() {
    let bus = bus();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let sub = bus.on(EventKind::ShelterOpened, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit(EventKind::ShelterOpened, json!({ "name": "Lakewood HS" }));
    sub.unsubscribe();
    bus.emit(EventKind::ShelterOpened, json!({ "name": "Gibbs HS" }));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn off_by_id_stops_notifications() {
    let bus = bus();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let sub = bus.on(EventKind::ContactAdded, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (kind, id) = sub.ids().next().unwrap();

    assert!(bus.off(kind, id));
    bus.emit(EventKind::ContactAdded, json!({ "name": "Lee Meyer" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn throwing_listener_does_not_block_queue_or_other_listeners() {
    let bus = bus();
    let _bad = bus.try_on(EventKind::CountyAdded, |_| {
        Err(ListenerError::failed("render failed"))
    });
    let _panics = bus.on(EventKind::CountyAdded, |_| panic!("listener bug"));
    let good = Recorder::watch(&bus, &[EventKind::CountyAdded]);

    let id = bus.emit(EventKind::CountyAdded, json!({ "name": "Manatee" }));

    assert_eq!(good.len(), 1);
    assert_eq!(bus.queued_events()[0].id(), id);
    assert_eq!(bus.stats().listener_failures, 2);
}

#[tokio::test]
async fn once_resolves_with_next_event_only() {
    let bus = bus();
    bus.emit(EventKind::OperationCreated, json!({ "name": "DR 100-25" }));

    let next = bus.once(EventKind::OperationCreated);
    bus.emit(EventKind::OperationCreated, json!({ "name": "DR 101-25" }));
    bus.emit(EventKind::OperationCreated, json!({ "name": "DR 102-25" }));

    let event = next.await.unwrap();
    assert_eq!(event.payload()["name"], "DR 101-25");
}

// =============================================================================
// Bounded queue
// =============================================================================

#[test]
fn capacity_three_keeps_newest_three() {
    let bus = EventBus::in_memory(BusConfig::default().with_queue_capacity(3));
    let ids: Vec<_> = (1..=5)
        .map(|n| bus.emit_irreversible(EventKind::OperationUpdated, json!({ "n": n })))
        .collect();

    let queued: Vec<_> = bus.queued_events().iter().map(EventRecord::id).collect();
    assert_eq!(queued, ids[2..]);
    assert_eq!(bus.stats().evicted_total, 2);
}

#[test]
fn eviction_is_reported_to_listeners() {
    let bus = EventBus::in_memory(BusConfig::default().with_queue_capacity(1));
    let evictions = Recorder::watch(&bus, &[EventKind::QueueEvicted]);

    let first = bus.emit_irreversible(EventKind::OperationUpdated, json!({}));
    bus.emit_irreversible(EventKind::OperationUpdated, json!({}));

    let reported = evictions.records();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].payload()["eventId"], json!(first.as_u64()));
    assert_eq!(reported[0].payload()["evictedTotal"], 1);
    assert_eq!(bus.queued_len(), 1);
}

#[test]
fn queue_never_exceeds_capacity() {
    let bus = EventBus::in_memory(BusConfig::default().with_queue_capacity(4));
    for n in 0..50 {
        bus.emit_irreversible(EventKind::OperationUpdated, json!({ "n": n }));
        assert!(bus.queued_len() <= 4);
    }
    assert_eq!(bus.stats().evicted_total, 46);
}

// =============================================================================
// Undo / redo
// =============================================================================

#[test]
fn pinellas_undo_scenario() {
    let bus = bus();
    let (roster, _added, _removed) = CountyRoster::attach(&bus);
    let added = Recorder::watch(&bus, &[EventKind::CountyAdded]);
    let removed = Recorder::watch(&bus, &[EventKind::CountyRemoved]);

    let original = bus.emit(EventKind::CountyAdded, json!({ "name": "Pinellas" }));
    assert_eq!(added.len(), 1);
    assert_eq!(added.records()[0].payload(), &json!({ "name": "Pinellas" }));
    assert_eq!(roster.counties(), vec!["Pinellas"]);

    bus.undo().unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed.records()[0].payload()["name"], "Pinellas");
    assert!(roster.counties().is_empty());

    assert_eq!(removed.kinds(), vec![EventKind::CountyRemoved]);
    let queued = bus.queued_events();
    assert!(queued.iter().any(|e| e.id() == original));
    assert_eq!(
        queued.iter().map(EventRecord::kind).collect::<Vec<_>>(),
        vec![EventKind::CountyAdded, EventKind::CountyRemoved]
    );
    assert_eq!(queued[1].metadata().extra.get("undoOf"), Some(&original.to_string()));
}

#[test]
fn second_undo_with_empty_history_is_noop() {
    let bus = bus();
    let (roster, _added, _removed) = CountyRoster::attach(&bus);

    bus.emit(EventKind::CountyAdded, json!({ "name": "Sarasota" }));
    assert!(bus.undo().is_some());
    assert!(bus.undo().is_none());
    assert!(roster.counties().is_empty());
    assert_eq!(bus.queued_len(), 2);
}

#[test]
fn redo_reapplies_undone_action() {
    let bus = bus();
    let (roster, _added, _removed) = CountyRoster::attach(&bus);

    let original = bus.emit(EventKind::CountyAdded, json!({ "name": "Polk" }));
    bus.undo();
    let redone = bus.redo().unwrap();

    assert_ne!(redone, original);
    assert_eq!(roster.counties(), vec!["Polk"]);
    assert!(bus.can_undo());
    assert!(!bus.can_redo());

    // The redone action is itself undoable.
    bus.undo();
    assert!(roster.counties().is_empty());
}

#[test]
fn new_emit_invalidates_redo() {
    let bus = bus();
    let (roster, _added, _removed) = CountyRoster::attach(&bus);

    bus.emit(EventKind::CountyAdded, json!({ "name": "Lee" }));
    bus.undo();
    bus.emit(EventKind::CountyAdded, json!({ "name": "Collier" }));

    assert!(bus.redo().is_none());
    assert_eq!(roster.counties(), vec!["Collier"]);
}

#[test]
fn undo_walks_back_through_multiple_actions() {
    let bus = bus();
    let (roster, _added, _removed) = CountyRoster::attach(&bus);

    for name in ["Citrus", "Hernando", "Pasco"] {
        bus.emit(EventKind::CountyAdded, json!({ "name": name }));
    }
    bus.undo();
    bus.undo();
    assert_eq!(roster.counties(), vec!["Citrus"]);

    bus.redo();
    assert_eq!(roster.counties(), vec!["Citrus", "Hernando"]);
    assert_eq!(bus.stats().redo_depth, 1);
}

#[test]
fn irreversible_events_are_invisible_to_undo() {
    let bus = bus();
    let (roster, _added, _removed) = CountyRoster::attach(&bus);

    bus.emit(EventKind::CountyAdded, json!({ "name": "Charlotte" }));
    bus.emit_irreversible(EventKind::CountyAdded, json!({ "name": "DeSoto" }));
    bus.emit(EventKind::ServiceLineUpdated, json!({ "line": "sheltering" }));

    bus.undo();
    assert_eq!(roster.counties(), vec!["DeSoto"]);
    assert!(!bus.can_undo());
}

#[test]
fn explicit_inverse_restores_previous_value() {
    let bus = bus();
    let status = Arc::new(std::sync::Mutex::new(String::from("green")));
    let current = Arc::clone(&status);
    let _sub = bus.on(EventKind::ServiceLineUpdated, move |event| {
        if let Some(value) = event.payload()["status"].as_str() {
            *current.lock().unwrap() = value.to_string();
        }
    });

    bus.emit_with(
        EventKind::ServiceLineUpdated,
        json!({ "line": "feeding", "status": "red" }),
        EmitOptions::new().with_inverse(InverseDescriptor::new(
            EventKind::ServiceLineUpdated,
            json!({ "line": "feeding", "status": "green" }),
        )),
    );
    assert_eq!(*status.lock().unwrap(), "red");

    bus.undo();
    assert_eq!(*status.lock().unwrap(), "green");
}

#[test]
fn status_kind_inverse_is_refused() {
    let bus = bus();
    let offline = Recorder::watch(&bus, &[EventKind::OfflineMode]);

    bus.emit_with(
        EventKind::ServiceLineUpdated,
        json!({ "line": "sheltering", "status": "amber" }),
        EmitOptions::new().with_inverse(InverseDescriptor::new(EventKind::OfflineMode, json!({}))),
    );

    assert!(!bus.can_undo());
    assert!(bus.undo().is_none());
    assert_eq!(offline.len(), 0);
}

#[test]
fn history_capacity_bounds_undo_depth() {
    let bus = EventBus::in_memory(BusConfig::default().with_history_capacity(2));
    for name in ["A", "B", "C", "D"] {
        bus.emit(EventKind::CountyAdded, json!({ "name": name }));
    }
    assert_eq!(bus.stats().undo_depth, 2);
    assert!(bus.undo().is_some());
    assert!(bus.undo().is_some());
    assert!(bus.undo().is_none());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn queue_survives_restart() {
    let storage = InMemoryStorage::new();
    let (bus, load) = EventBus::builder(storage.clone()).build();
    assert_eq!(load.unwrap().restored, 0);

    let ids: Vec<_> = ["Pinellas", "Pasco"]
        .iter()
        .map(|name| bus.emit(EventKind::CountyAdded, json!({ "name": name })))
        .collect();
    let device_id = bus.identity().device_id.clone();
    drop(bus);

    let (restarted, load) = EventBus::builder(storage).build();
    assert_eq!(load.unwrap().restored, 2);
    let queued = restarted.queued_events();
    assert_eq!(queued.iter().map(EventRecord::id).collect::<Vec<_>>(), ids);
    assert_eq!(payload_names(&queued), vec!["Pinellas", "Pasco"]);
    assert_eq!(restarted.identity().device_id, device_id);

    // Undo history is not carried across restarts; new ids keep increasing.
    assert!(!restarted.can_undo());
    let next = restarted.emit(EventKind::CountyAdded, json!({ "name": "Polk" }));
    assert!(next > ids[1]);
}

#[test]
fn corrupt_storage_starts_empty_and_reports() {
    let storage = InMemoryStorage::new();
    storage
        .write("audit_bus.queue", b"not json at all")
        .unwrap();

    let (bus, load) = EventBus::builder(storage).build();
    assert!(load.is_err());
    assert!(bus.queued_events().is_empty());

    bus.emit(EventKind::CountyAdded, json!({ "name": "Lake" }));
    assert_eq!(bus.queued_len(), 1);
}

#[test]
fn persistence_failure_keeps_event_in_memory() {
    let storage = InMemoryStorage::with_quota(64);
    let (bus, _) = EventBus::builder(storage).build();

    let recorder = Recorder::watch(&bus, &[EventKind::CountyAdded]);
    let id = bus.emit(EventKind::CountyAdded, json!({ "name": "Okeechobee" }));

    assert_eq!(recorder.len(), 1);
    assert!(bus.flush().is_err());
    assert_eq!(bus.queued_events()[0].id(), id);
    assert!(bus.stats().persist_failures >= 1);
}
