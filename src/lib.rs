//! Event-sourced audit/sync bus.
//!
//! Every state-changing action becomes an immutable [`EventRecord`] that is
//! dispatched to live listeners, appended to a bounded [`DurableQueue`]
//! persisted through a [`Storage`] backend, optionally recorded for undo, and
//! eventually delivered to a [`RemoteEventSink`] by the [`SyncProcessor`].

#[cfg(feature = "audit")]
pub mod audit;
pub mod bounded;
pub mod bus;
pub mod config;
pub mod error;
pub mod history;
pub mod listener;
pub mod network;
pub mod queue;
pub mod record;
pub mod storage;
pub mod sync;

#[cfg(feature = "audit")]
pub use audit::{export_csv, export_json, AuditRow};
pub use bounded::Bounded;
pub use bus::{BusStats, EmitOptions, EventBus, EventBusBuilder, Reversibility};
pub use config::{BusConfig, SyncConfig};
pub use record::{
    Connectivity, EventId, EventKind, EventMetadata, EventRecord, IdGenerator, InverseDescriptor,
    UnknownEventKind,
};
#[cfg(feature = "audit")]
pub use error::ExportError;
pub use error::{ConfigError, ListenerError, LoadError, PersistenceError, SinkError, StorageError};
pub use history::HistoryStack;
pub use listener::{ListenerId, ListenerRegistry, Once, Subscription, SubscriptionGuard};
pub use network::NetworkMonitor;
pub use queue::{DurableQueue, LoadReport, PersistJob, PersistOutcome};
#[cfg(feature = "fs")]
pub use storage::FileStorage;
pub use storage::{DeviceIdentity, InMemoryStorage, Storage};
pub use sync::{
    InMemorySink, RemoteEventSink, RetryGate, RetryPolicy, SkipReason, SyncHandle, SyncOutcome,
    SyncProcessor, SyncStats,
};
