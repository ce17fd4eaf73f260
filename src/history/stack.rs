use tracing::debug;

use crate::bounded::Bounded;
use crate::record::EventRecord;

/// Bounded undo and redo stacks.
///
/// Only reversible records enter. Overflow drops the oldest entry; the
/// durable queue, not this stack, is the audit record.
#[derive(Debug)]
pub struct HistoryStack {
    undo: Bounded<EventRecord>,
    redo: Bounded<EventRecord>,
}

impl HistoryStack {
    pub fn new(undo_capacity: usize, redo_capacity: usize) -> Self {
        HistoryStack {
            undo: Bounded::new(undo_capacity),
            redo: Bounded::new(redo_capacity),
        }
    }

    /// Record a newly emitted event. Any new action invalidates redo.
    /// Returns false (and changes nothing) for irreversible records.
    pub fn record(&mut self, event: EventRecord) -> bool {
        if !event.is_reversible() {
            return false;
        }
        self.redo.clear();
        self.push_undo(event);
        true
    }

    /// Push back onto undo without touching redo (used when redoing).
    pub fn push_undo(&mut self, event: EventRecord) {
        if let Some(dropped) = self.undo.push_back(event) {
            debug!(event_id = %dropped.id(), "undo history full; dropped oldest entry");
        }
    }

    pub fn push_redo(&mut self, event: EventRecord) {
        if let Some(dropped) = self.redo.push_back(event) {
            debug!(event_id = %dropped.id(), "redo history full; dropped oldest entry");
        }
    }

    pub fn take_undo(&mut self) -> Option<EventRecord> {
        self.undo.pop_back()
    }

    pub fn take_redo(&mut self) -> Option<EventRecord> {
        self.redo.pop_back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Keep only the newest `len` entries of each stack, returning how many
    /// were dropped in total.
    pub fn shrink_to(&mut self, len: usize) -> usize {
        self.undo.truncate_front(len) + self.redo.truncate_front(len)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
