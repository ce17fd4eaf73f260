use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use audit_bus::{EventBus, EventKind, EventRecord, SubscriptionGuard};

/// Records every record of the watched kinds, in dispatch order.
pub struct Recorder {
    seen: Arc<Mutex<Vec<EventRecord>>>,
    _guard: SubscriptionGuard,
}

impl Recorder {
    pub fn watch(bus: &EventBus, kinds: &[EventKind]) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let guard = bus
            .on_many(kinds, move |event| sink.lock().unwrap().push(event.clone()))
            .into_guard();
        Recorder {
            seen,
            _guard: guard,
        }
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.seen.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.records().iter().map(EventRecord::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// A tiny read model: the set of counties activated for the operation,
/// maintained purely from bus events.
#[derive(Clone, Default)]
pub struct CountyRoster {
    counties: Arc<Mutex<BTreeSet<String>>>,
}

impl CountyRoster {
    pub fn attach(bus: &EventBus) -> (Self, SubscriptionGuard, SubscriptionGuard) {
        let roster = CountyRoster::default();

        let added = roster.clone();
        let on_added = bus
            .on(EventKind::CountyAdded, move |event| {
                if let Some(name) = event.payload()["name"].as_str() {
                    added.counties.lock().unwrap().insert(name.to_string());
                }
            })
            .into_guard();

        let removed = roster.clone();
        let on_removed = bus
            .on(EventKind::CountyRemoved, move |event| {
                if let Some(name) = event.payload()["name"].as_str() {
                    removed.counties.lock().unwrap().remove(name);
                }
            })
            .into_guard();

        (roster, on_added, on_removed)
    }

    pub fn counties(&self) -> Vec<String> {
        self.counties.lock().unwrap().iter().cloned().collect()
    }
}
