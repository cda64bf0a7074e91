//! Bounded, age-limited variant of the guarded store.
//!
//! Used for the request history: one record per remote call would otherwise
//! accumulate without bound over a long-running mount. Entries expire lazily
//! by age (an over-age entry is simply never observable) and are evicted in
//! insertion order when the store exceeds its capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::Duration;
use serde_json::Value;

use super::{merge_json, CacheEntry, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, CacheEntry>,
    /// Keys in insertion order; eviction pops from the front.
    order: VecDeque<String>,
}

/// Guarded key/value store with a capacity limit and a maximum entry age.
///
/// Same external contract as [`super::GuardedKvStore`]; the limits are the
/// only behavioral difference.
#[derive(Debug)]
pub struct ExpiringKvStore {
    inner: RwLock<Inner>,
    max_len: usize,
    max_age: Duration,
}

impl ExpiringKvStore {
    /// Create an empty store holding at most `max_len` entries, each
    /// observable for at most `max_age` after insertion.
    pub fn new(max_len: usize, max_age: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_len,
            max_age,
        }
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner
            .map
            .values()
            .filter(|entry| self.is_live(entry))
            .count()
    }

    /// True if no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `key` is present and not expired.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.read().unwrap();
        inner.map.get(key).is_some_and(|entry| self.is_live(entry))
    }

    /// Insert or overwrite the value of `key`, evicting the oldest-inserted
    /// entries first if the capacity would be exceeded.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut inner = self.inner.write().unwrap();
        self.purge_expired(&mut inner);
        self.insert_into(&mut inner, key.into(), value);
    }

    /// Insert or overwrite all given `(key, value)` entries under one lock.
    pub fn bulk_insert(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        let mut inner = self.inner.write().unwrap();
        self.purge_expired(&mut inner);
        for (key, value) in entries {
            self.insert_into(&mut inner, key, value);
        }
    }

    /// Remove the entry of `key`. Expired entries count as absent.
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        self.purge_expired(&mut inner);
        match inner.map.remove(key) {
            Some(_) => {
                inner.order.retain(|k| k != key);
                Ok(())
            }
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    /// Remove the entries of all given keys; missing (or expired) keys are
    /// errors unless `ignore_missing` is set.
    pub fn bulk_remove(&self, keys: &[&str], ignore_missing: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        self.purge_expired(&mut inner);
        for key in keys {
            if inner.map.remove(*key).is_none() && !ignore_missing {
                return Err(StoreError::KeyNotFound((*key).to_string()));
            }
            inner.order.retain(|k| k != *key);
        }
        Ok(())
    }

    /// Snapshot of the entry of `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let inner = self.inner.read().unwrap();
        inner
            .map
            .get(key)
            .filter(|entry| self.is_live(entry))
            .cloned()
    }

    /// Full snapshot of the live entries.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        let inner = self.inner.read().unwrap();
        inner
            .map
            .iter()
            .filter(|(_, entry)| self.is_live(entry))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Snapshot of the requested subset of keys; expired entries count as
    /// missing.
    pub fn bulk_get(
        &self,
        keys: &[&str],
        ignore_missing: bool,
    ) -> StoreResult<HashMap<String, CacheEntry>> {
        let inner = self.inner.read().unwrap();
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            match inner.map.get(*key).filter(|entry| self.is_live(entry)) {
                Some(entry) => {
                    result.insert((*key).to_string(), entry.clone());
                }
                None if ignore_missing => {}
                None => return Err(StoreError::KeyNotFound((*key).to_string())),
            }
        }
        Ok(result)
    }

    /// Current live key set.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner
            .map
            .iter()
            .filter(|(_, entry)| self.is_live(entry))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Recursively merge `partial` into the existing value of `key`.
    pub fn update(&self, key: &str, partial: &Value) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        self.purge_expired(&mut inner);
        let entry = inner
            .map
            .get_mut(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
        merge_json(&mut entry.data, partial);
        entry.reserialize();
        Ok(())
    }

    fn is_live(&self, entry: &CacheEntry) -> bool {
        entry.age() <= self.max_age
    }

    fn insert_into(&self, inner: &mut Inner, key: String, value: Value) {
        match inner.map.get_mut(&key) {
            Some(entry) => entry.replace(value),
            None => {
                inner.order.push_back(key.clone());
                inner.map.insert(key, CacheEntry::new(value));
            }
        }
        while inner.map.len() > self.max_len {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop expired entries for real. Reads only filter them out; physical
    /// cleanup happens on the next write.
    fn purge_expired(&self, inner: &mut Inner) {
        let max_age = self.max_age;
        inner.map.retain(|_, entry| entry.age() <= max_age);
        let map = &inner.map;
        inner.order.retain(|key| map.contains_key(key));
    }
}
