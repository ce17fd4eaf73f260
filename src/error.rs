//! Error taxonomy for the bus.
//!
//! None of these reach the caller of `EventBus::emit`; they are recovered
//! inside the bus, logged, and surfaced through stats, load reports and
//! `sync-failed` events.

use thiserror::Error;

/// Durable storage substrate failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },
    #[error("storage io error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Writing the durable queue failed; the in-memory queue is kept intact.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to encode queue: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write queue: {0}")]
    Storage(#[from] StorageError),
}

/// Restoring the durable queue at startup failed; the queue starts empty.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read stored queue: {0}")]
    Storage(#[from] StorageError),
    #[error("stored queue is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("stored queue has unsupported format version {0}")]
    UnsupportedVersion(u32),
}

/// A listener handler reported a failure or panicked.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ListenerError {
    #[error("listener failed: {0}")]
    Failed(String),
    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub fn failed(message: impl Into<String>) -> Self {
        ListenerError::Failed(message.into())
    }
}

/// Remote delivery failed; the queue is left intact for retry.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("remote sink unreachable: {0}")]
    Unreachable(String),
    #[error("remote sink rejected batch: {0}")]
    Rejected(String),
    #[error("remote sink timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(feature = "audit")]
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer error: {0}")]
    Buffer(String),
}
