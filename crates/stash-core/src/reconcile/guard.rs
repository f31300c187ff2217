//! One reconciliation at a time per store.
//!
//! Handles are keyed by `CacheStore::identity`, so two store handles over the
//! same storage serialize against each other within the process. `FsStore`
//! additionally takes a file lock to cover other processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn slot(identity: &str) -> Arc<AsyncMutex<()>> {
    let registry = REGISTRY.get_or_init(Registry::default);
    let mut slots = registry.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slots.entry(identity.to_string()).or_default())
}

pub(crate) type PassGuard = OwnedMutexGuard<()>;

pub(crate) async fn acquire(identity: &str) -> PassGuard {
    slot(identity).lock_owned().await
}

pub(crate) fn try_acquire(identity: &str) -> Option<PassGuard> {
    slot(identity).try_lock_owned().ok()
}
