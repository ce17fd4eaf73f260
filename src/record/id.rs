use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time-ordered event identifier.
///
/// The value is a microsecond Unix timestamp, bumped forward whenever two ids
/// would otherwise collide, so ids are unique and strictly increasing in
/// emission order within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(value: u64) -> Self {
        EventId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Clock {
    last_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Hands out `(EventId, timestamp)` pairs that never go backwards, even when
/// the wall clock does.
#[derive(Debug, Default)]
pub struct IdGenerator {
    clock: Mutex<Clock>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after records restored from storage so new ids sort after them.
    pub fn seeded(last_id: EventId, last_timestamp: DateTime<Utc>) -> Self {
        IdGenerator {
            clock: Mutex::new(Clock {
                last_id: last_id.0,
                last_timestamp: Some(last_timestamp),
            }),
        }
    }

    pub fn next(&self) -> (EventId, DateTime<Utc>) {
        self.next_at(Utc::now())
    }

    pub(crate) fn next_at(&self, now: DateTime<Utc>) -> (EventId, DateTime<Utc>) {
        let mut clock = self
            .clock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let id = micros.max(clock.last_id.saturating_add(1));
        clock.last_id = id;

        let timestamp = match clock.last_timestamp {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        clock.last_timestamp = Some(timestamp);

        (EventId(id), timestamp)
    }
}
