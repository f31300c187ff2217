//! In-process store, used by tests and embedders that bring their own
//! persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use stash_domain::Manifest;

use super::{CacheEntry, CacheStore, StoreError, StoredAsset};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct MemoryStore {
    id: u64,
    entries: RwLock<HashMap<String, CacheEntry>>,
    baseline: RwLock<Option<Manifest>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            entries: RwLock::new(HashMap::new()),
            baseline: RwLock::new(None),
        }
    }

    /// Store a record without any checks. Lets tests plant damaged payloads.
    pub fn insert_raw(&self, entry: CacheEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(poison_err)?
            .insert(entry.path.clone(), entry);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().map_err(poison_err)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn identity(&self) -> String {
        format!("memory:{}", self.id)
    }

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.read().map_err(poison_err)?.get(path).cloned())
    }

    async fn head(&self, path: &str) -> Result<Option<StoredAsset>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(poison_err)?
            .get(path)
            .map(CacheEntry::describe))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), StoreError> {
        self.insert_raw(entry)
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .write()
            .map_err(poison_err)?
            .remove(path)
            .is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map_err(poison_err)?
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn snapshot(&self) -> Result<Vec<StoredAsset>, StoreError> {
        let mut assets: Vec<StoredAsset> = self
            .entries
            .read()
            .map_err(poison_err)?
            .values()
            .map(CacheEntry::describe)
            .collect();
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(assets)
    }

    async fn load_baseline(&self) -> Result<Option<Manifest>, StoreError> {
        Ok(self.baseline.read().map_err(poison_err)?.clone())
    }

    async fn save_baseline(&self, manifest: &Manifest) -> Result<(), StoreError> {
        *self.baseline.write().map_err(poison_err)? = Some(manifest.clone());
        Ok(())
    }

    async fn clear_baseline(&self) -> Result<(), StoreError> {
        *self.baseline.write().map_err(poison_err)? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_domain::{DigestAlgorithm, Integrity};

    fn entry(path: &str, body: &[u8]) -> CacheEntry {
        CacheEntry::new(
            path,
            Integrity::compute(DigestAlgorithm::Sha256, body),
            body.to_vec(),
        )
    }

    #[tokio::test]
    async fn put_replaces_and_delete_reports_presence() {
        let store = MemoryStore::new();
        store.put(entry("a", b"one")).await.unwrap();
        store.put(entry("a", b"two")).await.unwrap();
        let stored = store.get("a").await.unwrap().expect("entry");
        assert_eq!(stored.payload, b"two");
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn instances_have_distinct_identities() {
        assert_ne!(MemoryStore::new().identity(), MemoryStore::new().identity());
    }
}
