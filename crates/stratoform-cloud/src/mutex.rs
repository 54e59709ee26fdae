//! Named mutexes
//!
//! Resources that mutate the same parent object through non-atomic APIs
//! serialise on a key derived from that object's identity. Waiters are
//! served in FIFO order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Entries exist only while some caller holds or waits for the lock.
#[derive(Debug, Default)]
pub struct MutexRegistry {
    locks: LockMap,
}

/// Held while the named lock is owned; releases on drop.
#[derive(Debug)]
pub struct NamedGuard {
    key: String,
    lock: Arc<AsyncMutex<()>>,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NamedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map and one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2
            && locks.get(&self.key).is_some_and(|l| Arc::ptr_eq(l, &self.lock))
        {
            locks.remove(&self.key);
        }
        debug!(key = %self.key, "Released named lock");
    }
}

impl MutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits for and takes the lock named `key`.
    pub async fn lock(&self, key: &str) -> NamedGuard {
        debug!(key, "Acquiring named lock");
        let lock = self.entry(key);
        let guard = lock.clone().lock_owned().await;
        debug!(key, "Acquired named lock");
        NamedGuard {
            key: key.to_string(),
            lock,
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
