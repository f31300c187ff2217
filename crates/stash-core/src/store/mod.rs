//! Persistent key-value storage for cached assets.
//!
//! A store maps asset paths to `(hash, payload)` records and additionally
//! remembers the last manifest a reconciliation completed against (the
//! baseline). Writes are whole-record replacements: a reader sees either the
//! previous record or the new one, never a mix.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use stash_domain::{Integrity, Manifest};

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("[ST200] cache store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("[ST201] cache record at {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("[ST202] cache store is unavailable: {0}")]
    Unavailable(String),
    #[error("[ST203] cache baseline could not be decoded: {0}")]
    Baseline(String),
    #[error("[ST204] failed to lock cache store {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "ST200",
            Self::Corrupt { .. } => "ST201",
            Self::Unavailable(_) => "ST202",
            Self::Baseline(_) => "ST203",
            Self::Lock { .. } => "ST204",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A cached asset with its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    /// Digest the payload was verified against when it was stored.
    pub hash: Integrity,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn new(path: impl Into<String>, hash: Integrity, payload: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            hash,
            payload,
        }
    }

    /// Re-hash the payload and compare it with the recorded digest.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.hash.matches(&self.payload)
    }

    #[must_use]
    pub fn describe(&self) -> StoredAsset {
        StoredAsset {
            path: self.path.clone(),
            hash: self.hash.clone(),
            size: self.payload.len() as u64,
        }
    }
}

/// Metadata of a cached asset, without its payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredAsset {
    pub path: String,
    pub hash: Integrity,
    pub size: u64,
}

/// Exclusive hold on a store for the duration of a reconciliation pass.
///
/// Dropping the lease releases it.
#[derive(Debug, Default)]
pub struct StoreLease {
    _file: Option<File>,
}

impl StoreLease {
    pub(crate) fn file(file: File) -> Self {
        Self { _file: Some(file) }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stable name of the underlying storage; two handles that share storage
    /// must report the same identity.
    fn identity(&self) -> String;

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>, StoreError>;

    async fn head(&self, path: &str) -> Result<Option<StoredAsset>, StoreError>;

    /// Insert or atomically replace the record for `entry.path`.
    async fn put(&self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Returns `true` when a record was removed.
    async fn delete(&self, path: &str) -> Result<bool, StoreError>;

    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    async fn snapshot(&self) -> Result<Vec<StoredAsset>, StoreError> {
        let mut assets = Vec::new();
        for key in self.list_keys().await? {
            if let Some(asset) = self.head(&key).await? {
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    async fn load_baseline(&self) -> Result<Option<Manifest>, StoreError>;

    async fn save_baseline(&self, manifest: &Manifest) -> Result<(), StoreError>;

    async fn clear_baseline(&self) -> Result<(), StoreError>;

    /// Wait for exclusive access to the store.
    async fn lock(&self) -> Result<StoreLease, StoreError> {
        Ok(StoreLease::default())
    }

    /// Take exclusive access if nobody else holds it.
    async fn try_lock(&self) -> Result<Option<StoreLease>, StoreError> {
        Ok(Some(StoreLease::default()))
    }
}

/// Path to recorded digest for every stored asset.
pub(crate) async fn digest_index(
    store: &dyn CacheStore,
) -> Result<HashMap<String, Integrity>, StoreError> {
    Ok(store
        .snapshot()
        .await?
        .into_iter()
        .map(|asset| (asset.path, asset.hash))
        .collect())
}
