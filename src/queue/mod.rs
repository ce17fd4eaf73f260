//! Durable queue: the ordered, bounded, persisted buffer of events that have
//! not yet been confirmed delivered to the remote sink.

mod durable;

pub use durable::{DurableQueue, LoadReport, PersistJob, PersistOutcome};
