//! Bus configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Maximum undelivered events held before the oldest are evicted.
    pub queue_capacity: usize,
    /// Maximum undo (and redo) depth.
    pub history_capacity: usize,
    /// Storage key the durable queue is persisted under.
    pub storage_key: String,
    /// Actor stamped onto emitted records.
    pub actor_id: String,
    pub sync: SyncConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            queue_capacity: 1000,
            history_capacity: 50,
            storage_key: "audit_bus.queue".to_string(),
            actor_id: "anonymous".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub interval_ms: u64,
    pub batch_size: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive failures that open the circuit breaker.
    pub breaker_threshold: u32,
    pub breaker_cooldown_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interval_ms: 30_000,
            batch_size: 100,
            backoff_base_ms: 1_000,
            backoff_max_ms: 300_000,
            breaker_threshold: 5,
            breaker_cooldown_ms: 60_000,
        }
    }
}

impl SyncConfig {
    /// Never shorter than one millisecond; a zero period would stall the
    /// timer.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("sync.interval_ms", self.interval_ms),
            ("sync.batch_size", self.batch_size as u64),
            ("sync.breaker_threshold", u64::from(self.breaker_threshold)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfigError::Invalid {
                field: "sync.backoff_max_ms",
                reason: "must not be less than sync.backoff_base_ms".to_string(),
            });
        }
        Ok(())
    }
}

impl BusConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: BusConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("queue_capacity", self.queue_capacity),
            ("history_capacity", self.history_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        self.sync.validate()?;
        if self.storage_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "storage_key",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}
