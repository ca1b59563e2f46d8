//! Keyed record persistence.
//!
//! Gavel treats storage as an opaque load/save-by-key service. A
//! [`StorageBackend`] moves bytes; the [`Store`] on top of it owns the
//! decoded records:
//!
//! ```text
//! Store::load::<T>(default) ──▶ memo hit?  ──yes──▶ same Arc<RwLock<T>>
//!                                   │no
//!                                   ▼
//!                       backend.read(T::KEY) ──None──▶ default(), written at once
//!                                   │Some(bytes)
//!                                   ▼
//!                             serde_json decode
//! ```
//!
//! Every loaded record stays memoized for the life of the store, and
//! [`Store::save_all`] re-encodes all of them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::{PersistenceError, PersistenceResult};
use crate::health::{HealthReport, HealthStatus};

/// A record shared between the store and its users.
pub type Shared<T> = Arc<RwLock<T>>;

// ─── Backends ─────────────────────────────────────────────────────────────────

/// Byte-level storage keyed by record name.
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads the bytes stored under `key`, or `None` if absent.
    fn read(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>>;

    /// Replaces the bytes stored under `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> PersistenceResult<()>;
}

/// An in-process backend. Each instance is isolated.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `key` with raw bytes.
    pub fn with_entry(self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.lock().insert(key.into(), bytes.into());
        self
    }

    /// Returns a copy of the bytes under `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> PersistenceResult<()> {
        self.entries.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ─── Records ──────────────────────────────────────────────────────────────────

/// A value persisted under a fixed key.
pub trait PersistentObject: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage key, unique per record type.
    const KEY: &'static str;
}

trait ErasedRecord: Send + Sync {
    fn encode(&self) -> serde_json::Result<Vec<u8>>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: PersistentObject> ErasedRecord for RwLock<T> {
    fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&*self.read())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// Memoizing record store over a [`StorageBackend`].
pub struct Store {
    backend: Arc<dyn StorageBackend>,
    records: Mutex<HashMap<&'static str, Arc<dyn ErasedRecord>>>,
    last_save_failed: AtomicBool,
}

impl Store {
    /// Creates a store over `backend`.
    pub fn new(backend: impl StorageBackend) -> Self {
        Self::from_backend(Arc::new(backend))
    }

    /// Creates a store over a shared backend.
    pub fn from_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            records: Mutex::new(HashMap::new()),
            last_save_failed: AtomicBool::new(false),
        }
    }

    /// Creates a store over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Loads the record for `T`, memoized.
    ///
    /// The first call decodes the stored bytes, or builds `default` and writes
    /// it straight back when nothing is stored yet. Later calls return the same
    /// shared instance and never touch the backend.
    pub fn load<T, F>(&self, default: F) -> PersistenceResult<Shared<T>>
    where
        T: PersistentObject,
        F: FnOnce() -> T,
    {
        let mut records = self.records.lock();

        if let Some(record) = records.get(T::KEY) {
            return Arc::clone(record)
                .into_any()
                .downcast::<RwLock<T>>()
                .map_err(|_| PersistenceError::TypeMismatch {
                    key: T::KEY.to_string(),
                });
        }

        let shared: Shared<T> = match self.backend.read(T::KEY)? {
            Some(bytes) => {
                let value =
                    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
                        key: T::KEY.to_string(),
                        source,
                    })?;
                debug!(key = T::KEY, "Loaded persisted record");
                Arc::new(RwLock::new(value))
            }
            None => {
                let shared = Arc::new(RwLock::new(default()));
                write_record(&*self.backend, T::KEY, &*shared)?;
                info!(key = T::KEY, "No persisted record found, stored default");
                shared
            }
        };

        let erased: Arc<dyn ErasedRecord> = shared.clone();
        records.insert(T::KEY, erased);
        Ok(shared)
    }

    /// Writes the current value of one memoized record.
    pub fn save<T: PersistentObject>(&self, record: &Shared<T>) -> PersistenceResult<()> {
        write_record(&*self.backend, T::KEY, &**record)
    }

    /// Writes every memoized record.
    ///
    /// All records are attempted; the first failure is returned.
    pub fn save_all(&self) -> PersistenceResult<()> {
        let snapshot: Vec<(&'static str, Arc<dyn ErasedRecord>)> = self
            .records
            .lock()
            .iter()
            .map(|(key, record)| (*key, Arc::clone(record)))
            .collect();

        let mut first_error = None;
        for (key, record) in snapshot {
            if let Err(e) = write_record(&*self.backend, key, &*record) {
                error!(key, error = %e, "Failed to save record");
                first_error.get_or_insert(e);
            }
        }

        self.last_save_failed
            .store(first_error.is_some(), Ordering::Release);
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Saved all records");
                Ok(())
            }
        }
    }

    /// Number of memoized records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Health of the store, degraded after a failed save.
    pub fn health(&self) -> HealthReport {
        if self.last_save_failed.load(Ordering::Acquire) {
            HealthReport::new("Persistence", HealthStatus::ErrorNoncritical)
                .with_message("Last save failed")
        } else {
            HealthReport::new("Persistence", HealthStatus::Running)
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

fn write_record(
    backend: &dyn StorageBackend,
    key: &str,
    record: &dyn ErasedRecord,
) -> PersistenceResult<()> {
    let bytes = record.encode().map_err(|source| PersistenceError::Encode {
        key: key.to_string(),
        source,
    })?;
    backend.write(key, &bytes)
}
