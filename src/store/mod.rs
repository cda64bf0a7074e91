//! Thread-safe key/value stores backing the resource caches.
//!
//! Values are JSON documents. Every entry carries the canonical serialized
//! form of its value plus timestamps, so filesystem reads and attribute
//! lookups are answered without re-serializing. Reads hand out owned
//! snapshots, never references into the guarded map; a reckless caller can
//! at worst hold a stale copy, not alias shared state.

mod expiring;

pub use expiring::ExpiringKvStore;

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Errors surfaced by the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key is not present in the store. A missing key on
    /// `update`/`remove` indicates a bug in the caller, not an I/O
    /// condition, so it propagates instead of being swallowed.
    #[error("key not found: {0}")]
    KeyNotFound(String),
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// One cached value plus its serialized form and bookkeeping metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The structured value as last written.
    pub data: Value,
    /// Canonical JSON encoding of `data`.
    pub raw: Vec<u8>,
    /// Byte length of `raw`; maintained so `size == raw.len()` always holds.
    pub size: usize,
    /// When the key was first inserted.
    pub created_at: DateTime<Utc>,
    /// When the value was last replaced or merged.
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(data: Value) -> Self {
        let now = Utc::now();
        let raw = canonical_bytes(&data);
        Self {
            size: raw.len(),
            data,
            raw,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value wholesale, preserving `created_at`.
    fn replace(&mut self, data: Value) {
        self.raw = canonical_bytes(&data);
        self.size = self.raw.len();
        self.data = data;
        self.updated_at = Utc::now();
    }

    /// Re-derive `raw`/`size` after an in-place mutation of `data`.
    fn reserialize(&mut self) {
        self.raw = canonical_bytes(&self.data);
        self.size = self.raw.len();
        self.updated_at = Utc::now();
    }

    /// Time elapsed since the entry was first inserted.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Canonical serialization of a cached value.
///
/// `serde_json` emits object keys in map order (sorted), so the encoding is
/// deterministic for a given value.
fn canonical_bytes(data: &Value) -> Vec<u8> {
    serde_json::to_vec(data).expect("JSON value serialization cannot fail")
}

/// Recursive structural merge of `patch` into `dst`.
///
/// Object fields merge field-by-field; everything else overwrites.
pub(crate) fn merge_json(dst: &mut Value, patch: &Value) {
    match (dst, patch) {
        (Value::Object(dst_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                merge_json(dst_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (dst_slot, patch_value) => *dst_slot = patch_value.clone(),
    }
}

/// Reader-writer-guarded map from opaque key to [`CacheEntry`].
///
/// Concurrent readers proceed without blocking each other; a writer excludes
/// all access for the duration of the in-memory mutation only. No lock is
/// ever held across an external call.
#[derive(Debug, Default)]
pub struct GuardedKvStore {
    inner: RwLock<HashMap<String, CacheEntry>>,
}

impl GuardedKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// True if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().unwrap().contains_key(key)
    }

    /// Insert or overwrite the value of `key`.
    ///
    /// A fresh entry gets `created_at == updated_at == now`; overwriting an
    /// existing entry preserves its `created_at`.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut map = self.inner.write().unwrap();
        insert_into(&mut map, key.into(), value);
    }

    /// Insert or overwrite all given `(key, value)` entries under one lock.
    pub fn bulk_insert(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        let mut map = self.inner.write().unwrap();
        for (key, value) in entries {
            insert_into(&mut map, key, value);
        }
    }

    /// Remove the entry of `key`.
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let mut map = self.inner.write().unwrap();
        map.remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Remove the entries of all given keys; missing keys are errors unless
    /// `ignore_missing` is set.
    pub fn bulk_remove(&self, keys: &[&str], ignore_missing: bool) -> StoreResult<()> {
        let mut map = self.inner.write().unwrap();
        for key in keys {
            if map.remove(*key).is_none() && !ignore_missing {
                return Err(StoreError::KeyNotFound((*key).to_string()));
            }
        }
        Ok(())
    }

    /// Snapshot of the entry of `key`, if present.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Full shallow-copy snapshot of the mapping.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.inner.read().unwrap().clone()
    }

    /// Snapshot of the requested subset of keys; missing keys are errors
    /// unless `ignore_missing` is set.
    pub fn bulk_get(
        &self,
        keys: &[&str],
        ignore_missing: bool,
    ) -> StoreResult<HashMap<String, CacheEntry>> {
        let map = self.inner.read().unwrap();
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            match map.get(*key) {
                Some(entry) => {
                    result.insert((*key).to_string(), entry.clone());
                }
                None if ignore_missing => {}
                None => return Err(StoreError::KeyNotFound((*key).to_string())),
            }
        }
        Ok(result)
    }

    /// Current key set.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }

    /// Recursively merge `partial` into the existing value of `key`.
    ///
    /// Nested objects merge field-by-field; scalar and array fields are
    /// overwritten. The entry's serialized form and `updated_at` are
    /// refreshed; `created_at` is preserved.
    pub fn update(&self, key: &str, partial: &Value) -> StoreResult<()> {
        let mut map = self.inner.write().unwrap();
        update_in(&mut map, key, partial)
    }

    /// Apply [`GuardedKvStore::update`] to all given entries under one lock.
    pub fn bulk_update(
        &self,
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> StoreResult<()> {
        let mut map = self.inner.write().unwrap();
        for (key, partial) in entries {
            update_in(&mut map, &key, &partial)?;
        }
        Ok(())
    }
}

fn insert_into(map: &mut HashMap<String, CacheEntry>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(entry) => entry.replace(value),
        None => {
            map.insert(key, CacheEntry::new(value));
        }
    }
}

fn update_in(map: &mut HashMap<String, CacheEntry>, key: &str, partial: &Value) -> StoreResult<()> {
    let entry = map
        .get_mut(key)
        .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
    merge_json(&mut entry.data, partial);
    entry.reserialize();
    Ok(())
}
