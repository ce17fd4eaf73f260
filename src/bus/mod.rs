//! Event bus facade.
//!
//! ```text
//!  emit(kind, payload)
//!        │
//!        ▼
//!  ┌──────────────┐   dispatch    ┌───────────────────┐
//!  │   EventBus   │──────────────▶│ ListenerRegistry  │  (sync, in order)
//!  └──────────────┘               └───────────────────┘
//!        │ append (id order)
//!        ▼
//!  ┌──────────────┐   record      ┌───────────────────┐
//!  │ DurableQueue │               │   HistoryStack    │  (reversible only)
//!  └──────────────┘               └───────────────────┘
//!        │ dirty → wake
//!        ▼
//!  ┌──────────────┐   write       ┌───────────────────┐
//!  │  Persister   │──────────────▶│      Storage      │  (own thread)
//!  └──────────────┘               └───────────────────┘
//!
//!  ┌──────────────┐   deliver     ┌───────────────────┐
//!  │SyncProcessor │──────────────▶│  RemoteEventSink  │  (drains DurableQueue)
//!  └──────────────┘               └───────────────────┘
//! ```
//!
//! There is no global instance: the application builds one `EventBus` at its
//! composition root and hands clones to whoever needs it.

mod event_bus;
mod options;
mod persister;

pub use event_bus::{BusStats, EventBus, EventBusBuilder};
pub use options::{EmitOptions, Reversibility};
