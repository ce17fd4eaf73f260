use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::StorageError;

use super::store::Storage;

/// Directory-backed storage: one file per key.
///
/// Keys are base64url-encoded into file names so any key is a valid path
/// component. Writes land in a temp file that is renamed over the target, so
/// a crash mid-write leaves the previous blob readable.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(FileStorage { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.blob", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }
}

fn io_error(key: &str, source: io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

impl Storage for FileStorage {
    fn write(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        let target = self.path_for(key);
        let tmp = target.with_extension("blob.tmp");

        let mut file = fs::File::create(&tmp).map_err(|e| io_error(key, e))?;
        file.write_all(blob).map_err(|e| io_error(key, e))?;
        file.sync_all().map_err(|e| io_error(key, e))?;
        drop(file);

        fs::rename(&tmp, &target).map_err(|e| io_error(key, e))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key, e)),
        }
    }
}
