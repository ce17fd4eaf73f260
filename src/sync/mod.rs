//! Delivery of queued events to the remote event sink.
//!
//! Delivery is at-least-once: records leave the durable queue only after the
//! sink confirms a batch, so a lost acknowledgment means the batch is sent
//! again and the sink must ingest idempotently by event id.

mod backoff;
mod processor;
mod sink;

pub use backoff::{RetryGate, RetryPolicy};
pub use processor::{SkipReason, SyncHandle, SyncOutcome, SyncProcessor, SyncStats};
pub use sink::{InMemorySink, RemoteEventSink};
