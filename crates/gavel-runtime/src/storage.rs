//! JSON file persistence.
//!
//! Each record lives in `<data_dir>/<key>.json`. Writes go to `<key>.json.tmp` first and are
//! renamed over the target, so a crash mid-save leaves the previous file intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gavel_core::{PersistenceError, PersistenceResult, StorageBackend};
use tracing::trace;

/// A [`StorageBackend`] keeping one pretty-printed JSON file per record.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Creates the backend, creating `dir` if needed.
    pub fn open(dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PersistenceError::io(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for JsonFileBackend {
    fn read(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(key, e)),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> PersistenceResult<()> {
        let target = self.path_for(key);
        let staging = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&staging, bytes).map_err(|e| PersistenceError::io(key, e))?;
        fs::rename(&staging, &target).map_err(|e| PersistenceError::io(key, e))?;
        trace!(key, path = %target.display(), bytes = bytes.len(), "Wrote record");
        Ok(())
    }
}
