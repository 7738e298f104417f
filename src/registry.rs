//! Tracks the handler tasks currently in flight, so the supervisor can find the ones that have
//! been running longer than `stuck_time` without holding a lock over anyone else's book-keeping.
//!
//! There's no GC-backed weak collection to lean on here, so instead of faking one the completion
//! callback removes its own entry as soon as the task finishes. That's simpler than a weak map,
//! and it never leaves the registry holding anything that isn't still live.

use crate::atomic::{AtomicNumber, AtomicU64};
use crate::pool::PoolTask;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A handle used to remove a task from the [`Registry`] once it's done. Returned by
/// [`Registry::insert`].
pub type RegistryKey = u64;

pub struct Registry<T: PoolTask> {
    tasks: Mutex<HashMap<RegistryKey, T>>,
    next_key: AtomicU64,
}

impl<T: PoolTask> Registry<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_key: AtomicU64::from(0),
        }
    }

    /// Registers `task` and returns the key to use with [`Registry::remove`].
    pub fn insert(&self, task: T) -> RegistryKey {
        let key = self.next_key.add(1);
        self.tasks.lock().insert(key, task);
        key
    }

    /// Removes and returns the task registered under `key`, if it's still present (it may
    /// already have been removed by the supervisor's stuck-handler sweep).
    pub fn remove(&self, key: RegistryKey) -> Option<T> {
        self.tasks.lock().remove(&key)
    }

    /// A point-in-time copy of every currently-registered `(key, task)` pair. Cloned out from
    /// under the lock so the supervisor can call [`crate::pool::Pool::release`] on each one
    /// without holding the registry lock across it.
    pub fn snapshot(&self) -> Vec<(RegistryKey, T)> {
        self.tasks.lock().iter().map(|(key, task)| (*key, task.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: PoolTask> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
