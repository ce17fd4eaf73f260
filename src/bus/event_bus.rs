use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::record::{
    Connectivity, EventId, EventKind, EventMetadata, EventRecord, IdGenerator, InverseDescriptor,
};
use crate::error::{LoadError, PersistenceError};
use crate::history::HistoryStack;
use crate::listener::{ListenerId, ListenerRegistry, Once, Subscription};
use crate::queue::{DurableQueue, LoadReport, PersistOutcome};
use crate::storage::{DeviceIdentity, InMemoryStorage, Storage};

use super::options::EmitOptions;
use super::persister::Persister;

/// Point-in-time counters for status displays and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    pub queued: usize,
    pub evicted_total: u64,
    pub persist_failures: u64,
    pub listener_failures: u64,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub online: bool,
}

struct BusState {
    queue: DurableQueue,
    history: HistoryStack,
}

/// What a published record does to the undo history.
#[derive(Clone, Copy, PartialEq, Eq)]
enum HistoryEffect {
    /// New user action: push onto undo and invalidate redo.
    Record,
    /// Redo: push onto undo, keep the rest of redo.
    Restore,
    /// Undo's inverse: history is untouched.
    Skip,
}

/// Queue and history, shared with the background writer.
struct Shared {
    state: Mutex<BusState>,
    /// Serializes storage writes so an older image never lands last.
    writer: Mutex<()>,
    persist_failures: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the queue if storage is behind it. The state lock is held only
    /// to take the image and to record the result.
    fn flush(&self) -> Result<PersistOutcome, PersistenceError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let job = self.state().queue.persist_job();
        let Some(job) = job else {
            return Ok(PersistOutcome::Unchanged);
        };

        let result = job.run();
        let mut state = self.state();
        if let Ok(outcome) = &result {
            state.queue.finish_persist(job.generation(), outcome);
        }
        let failure = match &result {
            Ok(PersistOutcome::Compacted { events, dropped }) => Some(format!(
                "stored newest {events} events only; {dropped} held in memory"
            )),
            Ok(_) => None,
            Err(err) => Some(err.to_string()),
        };
        let Some(failure) = failure else {
            return result;
        };

        self.persist_failures.fetch_add(1, Ordering::Relaxed);
        let keep = state.history.undo_depth() / 2;
        let shed = state.history.shrink_to(keep);
        warn!(
            error = %failure,
            queued = state.queue.len(),
            history_shed = shed,
            "durable queue persistence degraded"
        );
        result
    }
}

struct Inner {
    registry: ListenerRegistry,
    ids: IdGenerator,
    shared: Arc<Shared>,
    persister: Persister,
    identity: DeviceIdentity,
    actor_id: String,
    online: AtomicBool,
    sync_wake: Arc<Notify>,
    listener_failures: AtomicU64,
}

/// Sole entry point for state-change notification.
///
/// Cloning is cheap and every clone drives the same queue, history and
/// listeners. All queue and history mutation happens behind one mutex, which
/// is never held while listeners run.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

pub struct EventBusBuilder {
    storage: Arc<dyn Storage>,
    config: BusConfig,
    connectivity: Connectivity,
}

impl EventBusBuilder {
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.config.actor_id = actor_id.into();
        self
    }

    /// Connectivity assumed until the network monitor reports otherwise.
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Build the bus, restoring any queue left by a previous process.
    ///
    /// Restoration never fails the build: on a load error the bus starts with
    /// an empty queue and the error is handed back for the caller to surface.
    pub fn build(self) -> (EventBus, Result<LoadReport, LoadError>) {
        if let Err(err) = self.config.validate() {
            warn!(error = %err, "bus config is invalid; zero capacities are raised to one");
        }
        let identity = DeviceIdentity::load_or_create(self.storage.as_ref());
        let mut queue = DurableQueue::new(
            Arc::clone(&self.storage),
            self.config.storage_key.clone(),
            self.config.queue_capacity,
        );

        let load = queue.load();
        match &load {
            Ok(report) => debug!(
                restored = report.restored,
                trimmed = report.trimmed,
                "restored durable queue"
            ),
            Err(err) => warn!(error = %err, "failed to restore durable queue; starting empty"),
        }

        let ids = match queue.newest() {
            Some(last) => IdGenerator::seeded(last.id(), last.timestamp()),
            None => IdGenerator::new(),
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(BusState {
                queue,
                history: HistoryStack::new(
                    self.config.history_capacity,
                    self.config.history_capacity,
                ),
            }),
            writer: Mutex::new(()),
            persist_failures: AtomicU64::new(0),
        });
        let writer = Arc::clone(&shared);
        let persister = Persister::spawn(move || {
            // Failures are counted and logged inside flush.
            let _ = writer.flush();
        });

        let bus = EventBus {
            inner: Arc::new(Inner {
                registry: ListenerRegistry::new(),
                ids,
                shared,
                persister,
                identity,
                actor_id: self.config.actor_id,
                online: AtomicBool::new(self.connectivity.is_online()),
                sync_wake: Arc::new(Notify::new()),
                listener_failures: AtomicU64::new(0),
            }),
        };
        (bus, load)
    }
}

impl EventBus {
    pub fn builder(storage: impl Storage + 'static) -> EventBusBuilder {
        Self::builder_shared(Arc::new(storage))
    }

    pub fn builder_shared(storage: Arc<dyn Storage>) -> EventBusBuilder {
        EventBusBuilder {
            storage,
            config: BusConfig::default(),
            connectivity: Connectivity::Online,
        }
    }

    /// A bus over fresh in-memory storage.
    pub fn in_memory(config: BusConfig) -> Self {
        Self::builder(InMemoryStorage::new()).config(config).build().0
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.inner.shared.state()
    }

    // ---------------------------------------------------------------------
    // Emission
    // ---------------------------------------------------------------------

    /// Emit with default options: reversible when the kind has a natural
    /// inverse.
    pub fn emit(&self, kind: EventKind, payload: Value) -> EventId {
        self.emit_with(kind, payload, EmitOptions::default())
    }

    pub fn emit_irreversible(&self, kind: EventKind, payload: Value) -> EventId {
        self.emit_with(kind, payload, EmitOptions::new().irreversible())
    }

    /// Build a record, notify listeners, queue it, and record it for undo.
    /// The storage write happens on the background writer. Never blocks on
    /// I/O and never fails; storage and listener failures are logged and
    /// counted.
    pub fn emit_with(&self, kind: EventKind, payload: Value, options: EmitOptions) -> EventId {
        let inverse = options.reversibility.resolve(kind, &payload);
        let record = self.build_record(kind, payload, inverse, options.extra);
        self.publish(record, HistoryEffect::Record)
    }

    fn build_record(
        &self,
        kind: EventKind,
        payload: Value,
        inverse: Option<InverseDescriptor>,
        extra: std::collections::BTreeMap<String, String>,
    ) -> EventRecord {
        let (id, timestamp) = self.inner.ids.next();
        let metadata = EventMetadata {
            device_id: Some(self.inner.identity.device_id.clone()),
            connectivity: self.connectivity(),
            extra,
        };
        EventRecord::new(
            id,
            kind,
            timestamp,
            self.inner.actor_id.clone(),
            self.inner.identity.session_id.clone(),
            payload,
            metadata,
            inverse,
        )
    }

    fn publish(&self, record: EventRecord, effect: HistoryEffect) -> EventId {
        let id = record.id();
        let kind = record.kind();

        let report = self.inner.registry.dispatch(&record);
        if report.failed > 0 {
            self.inner
                .listener_failures
                .fetch_add(report.failed as u64, Ordering::Relaxed);
        }

        if kind.is_local_only() {
            return id;
        }

        let evicted = {
            let mut state = self.state();
            let evicted = state.queue.append(record.clone());
            match effect {
                HistoryEffect::Record => {
                    state.history.record(record);
                }
                HistoryEffect::Restore => state.history.push_undo(record),
                HistoryEffect::Skip => {}
            }
            evicted.map(|old| (old, state.queue.evicted_total()))
        };
        self.inner.persister.wake();

        if let Some((old, evicted_total)) = evicted {
            self.emit_status(
                EventKind::QueueEvicted,
                json!({
                    "eventId": old.id(),
                    "kind": old.kind(),
                    "evictedTotal": evicted_total,
                }),
            );
        }

        if self.is_online() {
            self.inner.sync_wake.notify_waiters();
        }
        id
    }

    /// Write any unpersisted queue changes now, on the calling thread.
    ///
    /// Emission never waits for storage; call this before shutdown or when a
    /// caller needs the queue on disk. Failures are also counted in
    /// [`BusStats::persist_failures`].
    pub fn flush(&self) -> Result<PersistOutcome, PersistenceError> {
        self.inner.shared.flush()
    }

    /// Dispatch a status event (sync progress, connectivity, eviction).
    /// Status events are never queued or recorded for undo.
    pub(crate) fn emit_status(&self, kind: EventKind, payload: Value) -> EventId {
        debug_assert!(kind.is_local_only());
        let record = self.build_record(kind, payload, None, Default::default());
        self.publish(record, HistoryEffect::Skip)
    }

    // ---------------------------------------------------------------------
    // Subscription
    // ---------------------------------------------------------------------

    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        self.inner.registry.on(kind, handler)
    }

    pub fn try_on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EventRecord) -> Result<(), crate::error::ListenerError> + Send + Sync + 'static,
    {
        self.inner.registry.try_on(kind, handler)
    }

    pub fn on_many<F>(&self, kinds: &[EventKind], handler: F) -> Subscription
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        self.inner.registry.on_many(kinds, handler)
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.registry.off(kind, id)
    }

    pub fn once(&self, kind: EventKind) -> Once {
        self.inner.registry.once(kind)
    }

    // ---------------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------------

    /// Undo the most recent reversible action by emitting its inverse.
    ///
    /// Returns the id of the inverse record, or `None` when there is nothing
    /// to undo.
    pub fn undo(&self) -> Option<EventId> {
        let (original, inverse) = {
            let mut state = self.state();
            let original = state.history.take_undo()?;
            let Some(inverse) = original.inverse().cloned() else {
                return None;
            };
            // Moved to redo before the inverse is published so that a listener
            // emitting a fresh action invalidates it as usual.
            state.history.push_redo(original.clone());
            (original, inverse)
        };

        debug!(event_id = %original.id(), inverse = %inverse.kind, "undo");
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("undoOf".to_string(), original.id().to_string());
        let record = self.build_record(inverse.kind, inverse.payload, None, extra);
        Some(self.publish(record, HistoryEffect::Skip))
    }

    /// Re-emit the most recently undone action as a fresh record.
    pub fn redo(&self) -> Option<EventId> {
        let original = self.state().history.take_redo()?;

        debug!(event_id = %original.id(), kind = %original.kind(), "redo");
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("redoOf".to_string(), original.id().to_string());
        let record = self.build_record(
            original.kind(),
            original.payload().clone(),
            original.inverse().cloned(),
            extra,
        );
        Some(self.publish(record, HistoryEffect::Restore))
    }

    pub fn can_undo(&self) -> bool {
        self.state().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state().history.can_redo()
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    /// Snapshot of undelivered records in emission order.
    pub fn queued_events(&self) -> Vec<EventRecord> {
        self.state().queue.snapshot()
    }

    pub fn queued_len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn stats(&self) -> BusStats {
        let state = self.state();
        BusStats {
            queued: state.queue.len(),
            evicted_total: state.queue.evicted_total(),
            persist_failures: self.inner.shared.persist_failures.load(Ordering::Relaxed),
            listener_failures: self.inner.listener_failures.load(Ordering::Relaxed),
            undo_depth: state.history.undo_depth(),
            redo_depth: state.history.redo_depth(),
            online: self.is_online(),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.inner.actor_id
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.inner.identity
    }

    // ---------------------------------------------------------------------
    // Connectivity and sync plumbing
    // ---------------------------------------------------------------------

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    pub fn connectivity(&self) -> Connectivity {
        if self.is_online() {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    /// Store the new state, returning the previous one.
    pub(crate) fn swap_connectivity(&self, connectivity: Connectivity) -> Connectivity {
        if self
            .inner
            .online
            .swap(connectivity.is_online(), Ordering::SeqCst)
        {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub(crate) fn sync_wake(&self) -> Arc<Notify> {
        Arc::clone(&self.inner.sync_wake)
    }

    /// Oldest queued records with `id <= through`, at most `limit` of them.
    pub(crate) fn pending_batch(&self, limit: usize, through: EventId) -> Vec<EventRecord> {
        self.state()
            .queue
            .snapshot()
            .into_iter()
            .filter(|event| event.id() <= through)
            .take(limit)
            .collect()
    }

    pub(crate) fn newest_queued_id(&self) -> Option<EventId> {
        self.state().queue.newest().map(EventRecord::id)
    }

    /// Drop records the sink confirmed; the writer persists the change.
    pub(crate) fn acknowledge(&self, delivered: &[EventId]) -> usize {
        let removed = self.state().queue.remove_delivered(delivered);
        if removed > 0 {
            self.inner.persister.wake();
        }
        removed
    }
}
