use std::sync::Arc;

use crate::error::StorageError;

/// Key/blob persistence. One blob per key (latest write wins).
pub trait Storage: Send + Sync {
    /// Write (or overwrite) the blob stored under `key`.
    fn write(&self, key: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// Read the blob stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete the blob stored under `key`. Returns true if one existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn write(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        (**self).write(key, blob)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).read(key)
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key)
    }
}
