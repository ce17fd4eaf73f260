use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bounded::Bounded;
use crate::record::{EventId, EventRecord};
use crate::error::{LoadError, PersistenceError};
use crate::storage::Storage;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoredQueueRef<'a> {
    version: u32,
    evicted_total: u64,
    events: &'a [EventRecord],
}

#[derive(Deserialize)]
struct StoredQueue {
    version: u32,
    #[serde(default)]
    evicted_total: u64,
    events: Vec<EventRecord>,
}

/// Result of a `persist` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Nothing changed since the last successful write.
    Unchanged,
    /// The full queue was written.
    Written { events: usize },
    /// The full write failed; only the newest `events` were written and the
    /// oldest `dropped` are held in memory only.
    Compacted { events: usize, dropped: usize },
}

/// Result of a successful `load`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub restored: usize,
    /// Stored records beyond the configured capacity, dropped oldest first.
    pub trimmed: usize,
}

/// A copy of the queue taken under the bus lock and written outside it.
pub struct PersistJob {
    storage: Arc<dyn Storage>,
    key: String,
    generation: u64,
    evicted_total: u64,
    events: Vec<EventRecord>,
}

impl PersistJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Encode and write the captured queue.
    ///
    /// If the full write fails, the newest half is written instead so the
    /// most recent work survives a restart.
    pub fn run(&self) -> Result<PersistOutcome, PersistenceError> {
        let blob = self.encode(&self.events)?;
        let err = match self.storage.write(&self.key, &blob) {
            Ok(()) => {
                debug!(events = self.events.len(), bytes = blob.len(), "persisted durable queue");
                return Ok(PersistOutcome::Written {
                    events: self.events.len(),
                });
            }
            Err(err) => err,
        };

        let len = self.events.len();
        if len < 2 {
            return Err(err.into());
        }

        let keep = len / 2;
        warn!(error = %err, keep, len, "queue write failed; retrying with newest half");
        let blob = self.encode(&self.events[len - keep..])?;
        match self.storage.write(&self.key, &blob) {
            Ok(()) => Ok(PersistOutcome::Compacted {
                events: keep,
                dropped: len - keep,
            }),
            Err(_) => Err(err.into()),
        }
    }

    fn encode(&self, events: &[EventRecord]) -> Result<Vec<u8>, PersistenceError> {
        let stored = StoredQueueRef {
            version: FORMAT_VERSION,
            evicted_total: self.evicted_total,
            events,
        };
        Ok(serde_json::to_vec(&stored)?)
    }
}

/// Ordered, size-bounded, persisted buffer of undelivered events.
pub struct DurableQueue {
    storage: Arc<dyn Storage>,
    key: String,
    events: Bounded<EventRecord>,
    evicted_total: u64,
    generation: u64,
    persisted_generation: Option<u64>,
}

impl DurableQueue {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>, capacity: usize) -> Self {
        DurableQueue {
            storage,
            key: key.into(),
            events: Bounded::new(capacity),
            evicted_total: 0,
            generation: 0,
            persisted_generation: None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Total records lost to capacity eviction, across restarts.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    /// The record with the highest id (the tail).
    pub fn newest(&self) -> Option<&EventRecord> {
        self.events.back()
    }

    /// Owned copy of the queue in emission order.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.events.to_vec()
    }

    /// Append in id order. A full queue evicts its oldest record, which is
    /// returned and counted.
    ///
    /// A record emitted by a listener is appended before the record that
    /// triggered it; ordering by id puts it back behind its trigger.
    pub fn append(&mut self, event: EventRecord) -> Option<EventRecord> {
        self.generation += 1;
        let evicted = self.events.insert_ordered_by_key(event, EventRecord::id);
        if let Some(old) = &evicted {
            self.evicted_total += 1;
            warn!(
                event_id = %old.id(),
                kind = %old.kind(),
                evicted_total = self.evicted_total,
                "durable queue at capacity; evicted oldest undelivered event"
            );
        }
        evicted
    }

    /// Remove every record with `timestamp <= threshold`.
    pub fn clear_up_to(&mut self, threshold: DateTime<Utc>) -> usize {
        self.remove_where(|event| event.timestamp() <= threshold)
    }

    /// Remove every record with `id <= last`.
    ///
    /// Ids never tie, unlike timestamps.
    pub fn clear_through(&mut self, last: EventId) -> usize {
        self.remove_where(|event| event.id() <= last)
    }

    /// Remove exactly the records in `delivered`, wherever they sit.
    pub fn remove_delivered(&mut self, delivered: &[EventId]) -> usize {
        let delivered: HashSet<EventId> = delivered.iter().copied().collect();
        self.remove_where(|event| delivered.contains(&event.id()))
    }

    fn remove_where<F>(&mut self, remove: F) -> usize
    where
        F: Fn(&EventRecord) -> bool,
    {
        let before = self.events.len();
        self.events.retain(|event| !remove(event));
        let removed = before - self.events.len();
        if removed > 0 {
            self.generation += 1;
        }
        removed
    }

    /// Capture the current contents for writing, or `None` when storage
    /// already holds them.
    pub fn persist_job(&self) -> Option<PersistJob> {
        if self.persisted_generation == Some(self.generation) {
            return None;
        }
        Some(PersistJob {
            storage: Arc::clone(&self.storage),
            key: self.key.clone(),
            generation: self.generation,
            evicted_total: self.evicted_total,
            events: self.events.to_vec(),
        })
    }

    /// Record the result of a finished job. Only a full write of a generation
    /// at least as new as the last one marks the queue clean.
    pub fn finish_persist(&mut self, generation: u64, outcome: &PersistOutcome) {
        if let PersistOutcome::Written { .. } = outcome {
            if self.persisted_generation.map_or(true, |done| done < generation) {
                self.persisted_generation = Some(generation);
            }
        }
    }

    /// Write the queue to storage on the calling thread.
    pub fn persist(&mut self) -> Result<PersistOutcome, PersistenceError> {
        let Some(job) = self.persist_job() else {
            return Ok(PersistOutcome::Unchanged);
        };
        let outcome = job.run()?;
        self.finish_persist(job.generation(), &outcome);
        Ok(outcome)
    }

    /// Restore the queue from storage, replacing the in-memory contents.
    ///
    /// A missing blob is an empty queue. Unreadable or corrupt storage leaves
    /// the queue empty and reports why.
    pub fn load(&mut self) -> Result<LoadReport, LoadError> {
        self.events.clear();
        self.generation += 1;

        let Some(bytes) = self.storage.read(&self.key)? else {
            return Ok(LoadReport::default());
        };

        let stored: StoredQueue = serde_json::from_slice(&bytes)?;
        if stored.version != FORMAT_VERSION {
            return Err(LoadError::UnsupportedVersion(stored.version));
        }

        let events = stored.events;
        let restored = events.len();
        let mut trimmed = 0;
        for event in events {
            if self.events.push_back(event).is_some() {
                trimmed += 1;
            }
        }

        self.evicted_total = stored.evicted_total + trimmed as u64;
        if trimmed == 0 {
            self.persisted_generation = Some(self.generation);
        }

        Ok(LoadReport {
            restored: restored - trimmed,
            trimmed,
        })
    }
}
