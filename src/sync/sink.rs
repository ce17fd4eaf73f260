use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::record::{EventId, EventRecord};
use crate::error::SinkError;

/// External service that durably ingests delivered events.
///
/// Implementations must accept the same event id more than once without
/// applying it twice.
#[async_trait]
pub trait RemoteEventSink: Send + Sync {
    /// Deliver one batch. `Ok` means every record in the batch is durable on
    /// the remote side.
    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: RemoteEventSink + ?Sized> RemoteEventSink for Arc<S> {
    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), SinkError> {
        (**self).deliver(batch).await
    }
}

#[derive(Default)]
struct SinkState {
    stored: HashMap<EventId, EventRecord>,
    order: Vec<EventId>,
    batches: usize,
    redelivered: usize,
    fail_next: usize,
    failing: Option<SinkError>,
}

/// Idempotent in-process sink for tests and demos.
///
/// Clone-friendly (cloning shares the same state). Can be told to fail the
/// next N batches, or every batch until cleared.
#[derive(Clone, Default)]
pub struct InMemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next(&self, batches: usize) {
        self.state().fail_next = batches;
    }

    pub fn set_failing(&self, error: Option<SinkError>) {
        self.state().failing = error;
    }

    /// Distinct records ingested, in first-delivery order.
    pub fn records(&self) -> Vec<EventRecord> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|id| state.stored.get(id).cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.state().order.clone()
    }

    pub fn len(&self) -> usize {
        self.state().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().order.is_empty()
    }

    /// Batches accepted (including ones that were pure redelivery).
    pub fn batches(&self) -> usize {
        self.state().batches
    }

    /// Records received again after already being stored.
    pub fn redelivered(&self) -> usize {
        self.state().redelivered
    }
}

#[async_trait]
impl RemoteEventSink for InMemorySink {
    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), SinkError> {
        let mut state = self.state();
        if let Some(error) = &state.failing {
            return Err(error.clone());
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError::Unreachable("injected failure".to_string()));
        }

        state.batches += 1;
        for record in batch {
            if state.stored.contains_key(&record.id()) {
                state.redelivered += 1;
                continue;
            }
            state.order.push(record.id());
            state.stored.insert(record.id(), record.clone());
        }
        Ok(())
    }
}
