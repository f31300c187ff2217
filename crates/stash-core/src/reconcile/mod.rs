//! Converging a cache store on a manifest.
//!
//! A pass snapshots the store, plans against the manifest, fetches and
//! verifies what is missing or stale, replaces records atomically, evicts
//! what the manifest no longer lists and finally records the manifest as the
//! store's baseline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use stash_domain::{plan_reconcile, Manifest, ManifestError, PlannedFetch, ReconcilePlan};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::source::AssetSource;
use crate::store::{digest_index, CacheEntry, CacheStore, StoreError, StoreLease};

mod cancel;
mod fetch;
mod guard;
mod report;

pub use cancel::Cancellation;
pub use report::{AssetFailure, FailureKind, ReconcileReport, VerifyReport};

use fetch::{fetch_verified, FetchOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("[ST400] another reconciliation is already running against {store}")]
    Busy { store: String },
    #[error("[ST401] reconciliation worker failed: {0}")]
    Worker(String),
}

impl ReconcileError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Manifest(err) => err.code(),
            Self::Store(err) => err.code(),
            Self::Busy { .. } => "ST400",
            Self::Worker(_) => "ST401",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per asset, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        fetch::backoff(self.initial_backoff, self.max_backoff, attempt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Upper bound on fetches in flight.
    pub concurrency: usize,
    /// Per-attempt limit.
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    /// Re-hash stored payloads before planning.
    pub deep_verify: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            deep_verify: false,
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn AssetSource>,
    options: ReconcileOptions,
    cancel: Cancellation,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn AssetSource>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            store,
            source,
            options,
            cancel: Cancellation::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Token that stops the current (or next) pass at the next fetch
    /// boundary. It is re-armed once that pass ends.
    #[must_use]
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// Converge the store on `new`, waiting for any pass already running
    /// against the same store.
    ///
    /// `old` is the manifest the store was last reconciled against, if any.
    pub async fn reconcile(
        &self,
        old: Option<&Manifest>,
        new: &Manifest,
    ) -> Result<ReconcileReport, ReconcileError> {
        new.validate()?;
        let _guard = guard::acquire(&self.store.identity()).await;
        let _lease = self.store.lock().await?;
        self.run(old, new).await
    }

    /// Like [`Reconciler::reconcile`], but fails with
    /// [`ReconcileError::Busy`] instead of waiting.
    pub async fn try_reconcile(
        &self,
        old: Option<&Manifest>,
        new: &Manifest,
    ) -> Result<ReconcileReport, ReconcileError> {
        new.validate()?;
        let (_guard, _lease) = self.try_hold().await?;
        self.run(old, new).await
    }

    /// Reconcile against whatever baseline the store recorded last.
    pub async fn reconcile_from_baseline(
        &self,
        new: &Manifest,
        wait: bool,
    ) -> Result<ReconcileReport, ReconcileError> {
        new.validate()?;
        let (_guard, _lease) = if wait {
            let guard = guard::acquire(&self.store.identity()).await;
            (guard, self.store.lock().await?)
        } else {
            self.try_hold().await?
        };
        let old = load_baseline_lenient(self.store.as_ref()).await?;
        self.run(old.as_ref(), new).await
    }

    /// Compute what a pass would do without changing anything.
    pub async fn plan(
        &self,
        old: Option<&Manifest>,
        new: &Manifest,
    ) -> Result<ReconcilePlan, ReconcileError> {
        plan_against_store(self.store.as_ref(), old, new, self.options.deep_verify).await
    }

    pub async fn verify(&self, repair: bool) -> Result<VerifyReport, ReconcileError> {
        verify_store(self.store.as_ref(), repair).await
    }

    async fn try_hold(&self) -> Result<(guard::PassGuard, StoreLease), ReconcileError> {
        let identity = self.store.identity();
        let busy = || ReconcileError::Busy {
            store: identity.clone(),
        };
        let guard = guard::try_acquire(&identity).ok_or_else(busy)?;
        let lease = self.store.try_lock().await?.ok_or_else(busy)?;
        Ok((guard, lease))
    }

    async fn run(
        &self,
        old: Option<&Manifest>,
        new: &Manifest,
    ) -> Result<ReconcileReport, ReconcileError> {
        let result = self.run_pass(old, new).await;
        self.cancel.reset();
        result
    }

    async fn run_pass(
        &self,
        old: Option<&Manifest>,
        new: &Manifest,
    ) -> Result<ReconcileReport, ReconcileError> {
        let plan = build_plan(self.store.as_ref(), old, new, self.options.deep_verify).await?;
        if plan.inconsistent_baseline {
            warn!(
                version = %plan.version,
                "baseline shares this version but lists different assets; running a full pass"
            );
        }
        info!(
            version = %plan.version,
            pass = ?plan.pass,
            fetch = plan.fetch.len(),
            evict = plan.evict.len(),
            unchanged = plan.unchanged.len(),
            source = %self.source.describe(),
            "reconcile pass starting"
        );

        let mut report = ReconcileReport::new(&plan.version, plan.pass);
        report.inconsistent_baseline = plan.inconsistent_baseline;
        report.unchanged = plan.unchanged.len();

        self.fetch_all(plan.fetch, &mut report).await?;

        for path in plan.evict {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.store.delete(&path).await? {
                debug!(%path, "evicted");
                report.evicted.push(path);
            }
        }

        report.cancelled = self.cancel.is_cancelled();
        if report.cancelled {
            warn!(version = %new.version, "reconcile pass cancelled; baseline left unchanged");
        } else {
            self.store.save_baseline(new).await?;
            report.baseline_saved = true;
        }
        report.sort();
        info!(
            version = %report.version,
            added = report.added.len(),
            refetched = report.refetched.len(),
            evicted = report.evicted.len(),
            failed = report.failures.len(),
            bytes = report.bytes_fetched,
            "reconcile pass finished"
        );
        Ok(report)
    }

    async fn fetch_all(
        &self,
        planned: Vec<PlannedFetch>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for fetch in planned {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let source = Arc::clone(&self.source);
            let options = self.options.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::Skipped(fetch.path);
                };
                match fetch_verified(source.as_ref(), &fetch, &options, &cancel).await {
                    FetchOutcome::Verified { payload, attempts } => {
                        let bytes = payload.len() as u64;
                        let entry =
                            CacheEntry::new(fetch.path.clone(), fetch.hash.clone(), payload);
                        match store.put(entry).await {
                            Ok(()) => TaskOutcome::Stored {
                                fetch,
                                bytes,
                                attempts,
                            },
                            Err(err) => TaskOutcome::StoreFailed(err),
                        }
                    }
                    FetchOutcome::Failed(failure) => TaskOutcome::Failed(failure),
                    FetchOutcome::Cancelled => TaskOutcome::Skipped(fetch.path),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    tasks.abort_all();
                    return Err(ReconcileError::Worker(err.to_string()));
                }
            };
            match outcome {
                TaskOutcome::Stored {
                    fetch,
                    bytes,
                    attempts,
                } => {
                    debug!(path = %fetch.path, reason = ?fetch.reason, bytes, attempts, "stored");
                    report.bytes_fetched += bytes;
                    if fetch.replaces_existing() {
                        report.refetched.push(fetch.path);
                    } else {
                        report.added.push(fetch.path);
                    }
                }
                TaskOutcome::Failed(failure) => report.failures.push(failure),
                TaskOutcome::Skipped(path) => report.skipped.push(path),
                TaskOutcome::StoreFailed(err) => {
                    tasks.abort_all();
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

enum TaskOutcome {
    Stored {
        fetch: PlannedFetch,
        bytes: u64,
        attempts: u32,
    },
    Failed(AssetFailure),
    Skipped(String),
    StoreFailed(StoreError),
}

/// Dry-run planning against the current store contents.
pub async fn plan_against_store(
    store: &dyn CacheStore,
    old: Option<&Manifest>,
    new: &Manifest,
    deep_verify: bool,
) -> Result<ReconcilePlan, ReconcileError> {
    new.validate()?;
    build_plan(store, old, new, deep_verify).await
}

async fn build_plan(
    store: &dyn CacheStore,
    old: Option<&Manifest>,
    new: &Manifest,
    deep_verify: bool,
) -> Result<ReconcilePlan, ReconcileError> {
    let cached = digest_index(store).await?;
    let mut corrupt = HashSet::new();
    if deep_verify {
        for entry in &new.entries {
            if cached.get(&entry.path) != Some(&entry.hash) {
                continue;
            }
            if let Some(stored) = store.get(&entry.path).await? {
                if !stored.is_intact() {
                    warn!(path = %entry.path, "stored payload no longer matches its digest");
                    corrupt.insert(entry.path.clone());
                }
            }
        }
    }
    Ok(plan_reconcile(old, new, &cached, &corrupt))
}

/// Re-hash every stored payload, optionally deleting the damaged ones.
pub async fn verify_store(
    store: &dyn CacheStore,
    repair: bool,
) -> Result<VerifyReport, ReconcileError> {
    let _guard = guard::acquire(&store.identity()).await;
    let _lease = store.lock().await?;
    let mut report = VerifyReport::default();
    for key in store.list_keys().await? {
        let Some(entry) = store.get(&key).await? else {
            continue;
        };
        report.checked += 1;
        if entry.is_intact() {
            continue;
        }
        warn!(path = %key, "stored payload no longer matches its digest");
        if repair && store.delete(&key).await? {
            report.removed.push(key.clone());
        }
        report.corrupt.push(key);
    }
    Ok(report)
}

/// Load the store's baseline, treating an undecodable one as absent so the
/// next pass rebuilds it.
pub(crate) async fn load_baseline_lenient(
    store: &dyn CacheStore,
) -> Result<Option<Manifest>, StoreError> {
    match store.load_baseline().await {
        Ok(baseline) => Ok(baseline),
        Err(StoreError::Baseline(reason)) => {
            warn!(%reason, "ignoring unreadable baseline");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests;
