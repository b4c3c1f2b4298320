use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use log::trace;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async mutexes, one per key, created on demand.
///
/// Writers that touch the same payment (as identified by its canonical id) acquire the same lock, so that the
/// lookup-then-write sequence of an upsert cannot interleave with another writer for that payment. Writers for
/// different keys never block each other. Cloning a `KeyedLocks` gives a handle onto the same set of locks.
///
/// Entries are removed once nobody holds or waits on them.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Holds the lock for a key until dropped.
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Debug for KeyedLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyedLocks ({} keys)", self.len())
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the lock for `key` is free and takes it.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|k, m| k == key || Arc::strong_count(m) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        trace!("🔒️ Waiting for write lock on {key}");
        let guard = mutex.lock_owned().await;
        KeyGuard { key: key.to_string(), _guard: guard }
    }

    /// The number of keys currently tracked. Idle keys are only pruned on the next call to [`Self::lock`].
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
