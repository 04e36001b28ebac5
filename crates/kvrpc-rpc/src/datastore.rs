//! The key-indexed datastore served over RPC.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::message::RemoteErrorKind;

/// Failures of a [`Datastore`] operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatastoreError {
    /// The index or data was rejected.
    #[error("{0}")]
    InvalidArgument(String),

    /// Nothing was ever written at `index`.
    #[error("No element at index {index}")]
    NotFound { index: u64 },
}

impl DatastoreError {
    /// Kind reported to RPC clients.
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::InvalidArgument(_) => RemoteErrorKind::InvalidArgument,
            Self::NotFound { .. } => RemoteErrorKind::NotFound,
        }
    }
}

/// Key-value capability keyed by non-negative integer.
///
/// Implementations are shared by every connection handler, so they must be
/// safe to call concurrently.
pub trait Datastore: Send + Sync {
    /// Store `data` at `index`, replacing any previous value.
    fn write(&self, index: u64, data: String) -> Result<(), DatastoreError>;

    /// Value last written at `index`.
    fn read(&self, index: u64) -> Result<String, DatastoreError>;
}

/// In-memory [`Datastore`] guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: Mutex<HashMap<u64, String>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Datastore for MemoryDatastore {
    fn write(&self, index: u64, data: String) -> Result<(), DatastoreError> {
        debug!(index, len = data.len(), "datastore write");
        self.lock().insert(index, data);
        Ok(())
    }

    fn read(&self, index: u64) -> Result<String, DatastoreError> {
        self.lock()
            .get(&index)
            .cloned()
            .ok_or(DatastoreError::NotFound { index })
    }
}
