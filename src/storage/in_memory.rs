use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::StorageError;

use super::store::Storage;

/// In-memory storage backed by `Arc<RwLock<HashMap>>`.
///
/// Clone-friendly (cloning shares the same underlying storage). An optional
/// byte quota makes writes fail the way a full browser or device store does.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    quota: Option<usize>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any write that would push the total stored bytes over `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Number of successful writes, for observing persistence behavior.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn bytes_used(&self) -> usize {
        self.storage
            .read()
            .map(|storage| storage.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl Storage for InMemoryStorage {
    fn write(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| StorageError::LockPoisoned("storage write"))?;

        if let Some(quota) = self.quota {
            let others: usize = storage
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let available = quota.saturating_sub(others);
            if blob.len() > available {
                return Err(StorageError::QuotaExceeded {
                    needed: blob.len(),
                    available,
                });
            }
        }

        storage.insert(key.to_string(), blob.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| StorageError::LockPoisoned("storage read"))?;
        Ok(storage.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| StorageError::LockPoisoned("storage write"))?;
        Ok(storage.remove(key).is_some())
    }
}
