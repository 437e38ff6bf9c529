//! Lock-guarded store shared by forked workers and the parent.

use crate::errors::StoreError;
use crate::store::KeyedStore;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Multi-writer store for collecting results across fork workers.
///
/// Cloning yields another handle to the same store. Every access goes
/// through [`ForkStore::with_lock`], so a read-modify-write sequence is one
/// critical section.
#[derive(Debug, Clone, Default)]
pub struct ForkStore {
    inner: Arc<Mutex<KeyedStore>>,
}

impl ForkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `critical` with the lock held.
    ///
    /// The lock is released on every exit path; an error returned by
    /// `critical` propagates after release.
    pub fn with_lock<R, E>(
        &self,
        critical: impl FnOnce(&mut KeyedStore) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.inner.lock().map_err(|_| StoreError::LockPoisoned)?;
        critical(&mut guard)
    }

    /// Append `value` to the list under `key`, creating the list if needed.
    ///
    /// A non-list value already under `key` becomes the first list element.
    pub fn append(&self, key: &str, value: Value) -> Result<usize, StoreError> {
        self.with_lock(|store| {
            let mut list = match store.remove(key) {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            list.push(value);
            let len = list.len();
            store.set(key, Value::Array(list));
            Ok(len)
        })
    }

    /// Add `delta` to the integer counter under `key` (missing counts as 0).
    pub fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_lock(|store| {
            let current = if store.contains(key) {
                store.get_i64(key)?
            } else {
                0
            };
            let next = current + delta;
            store.set(key, next);
            Ok(next)
        })
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<KeyedStore, StoreError> {
        self.with_lock(|store| Ok(store.clone()))
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.with_lock(|store| {
            store.clear();
            Ok(())
        })
    }
}
