use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use stash_domain::{DigestAlgorithm, Integrity, ManifestEntry, PassKind};
use tokio::sync::Semaphore;

use super::*;
use crate::source::FetchError;
use crate::store::{MemoryStore, StoredAsset};

fn hash(body: &str) -> Integrity {
    Integrity::compute(DigestAlgorithm::Sha256, body.as_bytes())
}

fn manifest(version: &str, entries: &[(&str, &str)]) -> Manifest {
    Manifest::new(
        version,
        entries
            .iter()
            .map(|(path, body)| ManifestEntry::new(*path, hash(body)))
            .collect(),
    )
}

fn options() -> ReconcileOptions {
    ReconcileOptions {
        concurrency: 4,
        fetch_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        deep_verify: false,
    }
}

#[derive(Clone, Copy)]
enum Fault {
    /// Fail with HTTP 503 this many times, then serve.
    Transient(u32),
    Always(u16),
    /// Serve these bytes instead of the real body.
    Tampered(&'static str),
}

/// Serves bodies from a map, with optional per-path faults.
#[derive(Default)]
struct MapSource {
    bodies: Mutex<HashMap<String, String>>,
    faults: Mutex<HashMap<String, Fault>>,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
    /// Each fetch consumes one permit before it proceeds.
    gate: Option<Arc<Semaphore>>,
}

impl MapSource {
    fn serving(entries: &[(&str, &str)]) -> Self {
        let source = Self::default();
        source.serve(entries);
        source
    }

    fn serve(&self, entries: &[(&str, &str)]) {
        let mut bodies = self.bodies.lock().unwrap();
        for (path, body) in entries {
            bodies.insert((*path).to_string(), (*body).to_string());
        }
    }

    fn fault(&self, path: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(path.to_string(), fault);
    }

    fn calls(&self, path: &str) -> u32 {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AssetSource for MapSource {
    fn describe(&self) -> String {
        "map".to_string()
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(path.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let fault = self.faults.lock().unwrap().get(path).copied();
        match fault {
            Some(Fault::Transient(times)) if call <= times => {
                return Err(FetchError::Status {
                    path: path.to_string(),
                    status: 503,
                })
            }
            Some(Fault::Always(status)) => {
                return Err(FetchError::Status {
                    path: path.to_string(),
                    status,
                })
            }
            Some(Fault::Tampered(body)) => return Ok(body.as_bytes().to_vec()),
            _ => {}
        }
        self.bodies
            .lock()
            .unwrap()
            .get(path)
            .map(|body| body.as_bytes().to_vec())
            .ok_or_else(|| FetchError::NotFound {
                path: path.to_string(),
            })
    }
}

fn reconciler(store: &Arc<MemoryStore>, source: &Arc<MapSource>) -> Reconciler {
    reconciler_with(store, source, options())
}

fn reconciler_with(
    store: &Arc<MemoryStore>,
    source: &Arc<MapSource>,
    options: ReconcileOptions,
) -> Reconciler {
    let store: Arc<dyn CacheStore> = store.clone();
    let source: Arc<dyn AssetSource> = source.clone();
    Reconciler::new(store, source, options)
}

async fn stored(store: &MemoryStore) -> Vec<(String, Integrity)> {
    store
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|asset: StoredAsset| (asset.path, asset.hash))
        .collect()
}

#[tokio::test]
async fn worked_example_across_three_versions() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A"), ("b", "B")]));
    let reconciler = reconciler(&store, &source);

    let v1 = manifest("v1", &[("a", "A")]);
    let report = reconciler.reconcile(None, &v1).await.expect("v1");
    assert_eq!(report.added, vec!["a".to_string()]);
    assert_eq!(report.pass, PassKind::Full);
    assert_eq!(stored(&store).await, vec![("a".to_string(), hash("A"))]);

    let v2 = manifest("v2", &[("a", "A"), ("b", "B")]);
    let report = reconciler.reconcile(Some(&v1), &v2).await.expect("v2");
    assert_eq!(report.added, vec!["b".to_string()]);
    assert_eq!(report.unchanged, 1);
    assert!(report.refetched.is_empty() && report.evicted.is_empty());

    source.serve(&[("b", "B2")]);
    let v3 = manifest("v3", &[("b", "B2")]);
    let report = reconciler.reconcile(Some(&v2), &v3).await.expect("v3");
    assert_eq!(report.evicted, vec!["a".to_string()]);
    assert_eq!(report.refetched, vec!["b".to_string()]);
    assert!(report.added.is_empty());
    assert_eq!(stored(&store).await, vec![("b".to_string(), hash("B2"))]);
    assert_eq!(store.load_baseline().await.unwrap(), Some(v3));
}

#[tokio::test]
async fn second_pass_with_same_manifest_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A"), ("b", "B")]));
    let reconciler = reconciler(&store, &source);
    let current = manifest("v1", &[("a", "A"), ("b", "B")]);

    reconciler.reconcile(None, &current).await.expect("first");
    let report = reconciler
        .reconcile(Some(&current), &current)
        .await
        .expect("second");
    assert_eq!(report.pass, PassKind::Verify);
    assert_eq!(report.changed(), 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(source.calls("a"), 1);
}

#[tokio::test]
async fn store_keys_match_manifest_after_success() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(CacheEntry::new("orphan", hash("O"), b"O".to_vec()))
        .await
        .unwrap();
    let source = Arc::new(MapSource::serving(&[
        ("index.html", "<html>"),
        ("css/app.css", "body{}"),
        ("_framework/app.wasm", "wasm"),
    ]));
    let next = manifest(
        "v1",
        &[
            ("index.html", "<html>"),
            ("css/app.css", "body{}"),
            ("_framework/app.wasm", "wasm"),
        ],
    );
    let report = reconciler(&store, &source)
        .reconcile(None, &next)
        .await
        .expect("reconcile");
    assert!(report.is_complete());
    let mut expected: Vec<String> = next.entries.iter().map(|e| e.path.clone()).collect();
    expected.sort();
    assert_eq!(store.list_keys().await.unwrap(), expected);
}

#[tokio::test]
async fn tampered_payload_is_never_stored() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A"), ("b", "B")]));
    source.fault("b", Fault::Tampered("evil"));
    let report = reconciler(&store, &source)
        .reconcile(None, &manifest("v1", &[("a", "A"), ("b", "B")]))
        .await
        .expect("reconcile");

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.path, "b");
    assert_eq!(failure.kind, FailureKind::IntegrityMismatch);
    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.actual.as_deref(), Some(hash("evil").to_string().as_str()));
    assert!(store.get("b").await.unwrap().is_none());
    assert_eq!(source.calls("b"), 1);
}

#[tokio::test]
async fn failed_refetch_keeps_previous_copy() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A")]));
    let reconciler = reconciler(&store, &source);
    let v1 = manifest("v1", &[("a", "A")]);
    reconciler.reconcile(None, &v1).await.expect("v1");

    source.fault("a", Fault::Always(500));
    let v2 = manifest("v2", &[("a", "A2")]);
    let report = reconciler.reconcile(Some(&v1), &v2).await.expect("v2");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::FetchFailure);
    let kept = store.get("a").await.unwrap().expect("old copy retained");
    assert_eq!(kept.payload, b"A");
}

/// Records, at each fetch, whether the path being fetched is still readable.
struct GapWatchSource {
    store: Arc<MemoryStore>,
    inner: MapSource,
    gaps: Mutex<Vec<String>>,
}

#[async_trait]
impl AssetSource for GapWatchSource {
    fn describe(&self) -> String {
        "gap-watch".to_string()
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        if self.store.head(path).await.unwrap().is_none() {
            self.gaps.lock().unwrap().push(path.to_string());
        }
        self.inner.fetch(path).await
    }
}

#[tokio::test]
async fn stale_entries_stay_readable_while_replaced() {
    let store = Arc::new(MemoryStore::new());
    for (path, body) in [("a", "A"), ("b", "B")] {
        store
            .put(CacheEntry::new(path, hash(body), body.as_bytes().to_vec()))
            .await
            .unwrap();
    }
    let watcher = Arc::new(GapWatchSource {
        store: Arc::clone(&store),
        inner: MapSource::serving(&[("a", "A2"), ("b", "B2")]),
        gaps: Mutex::new(Vec::new()),
    });
    let old = manifest("v1", &[("a", "A"), ("b", "B")]);
    let new = manifest("v2", &[("a", "A2"), ("b", "B2")]);
    let cache: Arc<dyn CacheStore> = store.clone();
    let report = Reconciler::new(cache, watcher.clone(), options())
        .reconcile(Some(&old), &new)
        .await
        .expect("reconcile");
    assert_eq!(report.refetched.len(), 2);
    assert!(watcher.gaps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_path_does_not_block_others() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(CacheEntry::new("gone", hash("G"), b"G".to_vec()))
        .await
        .unwrap();
    let source = Arc::new(MapSource::serving(&[("p", "P"), ("q", "Q"), ("r", "R")]));
    source.fault("p", Fault::Always(503));
    let report = reconciler(&store, &source)
        .reconcile(None, &manifest("v1", &[("p", "P"), ("q", "Q"), ("r", "R")]))
        .await
        .expect("reconcile");

    assert_eq!(report.added, vec!["q".to_string(), "r".to_string()]);
    assert_eq!(report.evicted, vec!["gone".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].attempts, 3);
    assert_eq!(source.calls("p"), 3);
    assert!(report.baseline_saved);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A")]));
    source.fault("a", Fault::Transient(2));
    let report = reconciler(&store, &source)
        .reconcile(None, &manifest("v1", &[("a", "A")]))
        .await
        .expect("reconcile");
    assert_eq!(report.added, vec!["a".to_string()]);
    assert_eq!(source.calls("a"), 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::default());
    let report = reconciler(&store, &source)
        .reconcile(None, &manifest("v1", &[("missing", "M")]))
        .await
        .expect("reconcile");
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(report.failures[0].code, Some("ST300"));
}

#[tokio::test]
async fn slow_fetches_time_out() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource {
        delay: Some(Duration::from_millis(200)),
        ..MapSource::default()
    });
    source.serve(&[("slow", "S")]);
    let mut opts = options();
    opts.fetch_timeout = Duration::from_millis(10);
    opts.retry.max_attempts = 2;
    let report = reconciler_with(&store, &source, opts)
        .reconcile(None, &manifest("v1", &[("slow", "S")]))
        .await
        .expect("reconcile");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].code, Some("ST303"));
    assert_eq!(report.failures[0].attempts, 2);
}

#[tokio::test]
async fn fetches_respect_concurrency_limit() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource {
        delay: Some(Duration::from_millis(10)),
        ..MapSource::default()
    });
    let bodies: Vec<(String, String)> = (0..12)
        .map(|i| (format!("asset-{i}.js"), format!("body {i}")))
        .collect();
    let pairs: Vec<(&str, &str)> = bodies
        .iter()
        .map(|(path, body)| (path.as_str(), body.as_str()))
        .collect();
    source.serve(&pairs);
    let mut opts = options();
    opts.concurrency = 3;
    let report = reconciler_with(&store, &source, opts)
        .reconcile(None, &manifest("v1", &pairs))
        .await
        .expect("reconcile");
    assert_eq!(report.added.len(), 12);
    let peak = source.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
}

#[tokio::test]
async fn malformed_manifest_aborts_before_mutation() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(CacheEntry::new("keep", hash("K"), b"K".to_vec()))
        .await
        .unwrap();
    let source = Arc::new(MapSource::serving(&[("a", "A")]));
    let bad = manifest("v1", &[("a", "A"), ("a", "A")]);
    let err = reconciler(&store, &source)
        .reconcile(None, &bad)
        .await
        .expect_err("duplicate path");
    assert_eq!(err.code(), "ST101");
    assert_eq!(store.list_keys().await.unwrap(), vec!["keep".to_string()]);
    assert_eq!(source.calls("a"), 0);
}

/// Memory store whose writes fail.
struct BrokenStore {
    inner: MemoryStore,
}

#[async_trait]
impl CacheStore for BrokenStore {
    fn identity(&self) -> String {
        self.inner.identity()
    }

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.inner.get(path).await
    }

    async fn head(&self, path: &str) -> Result<Option<StoredAsset>, StoreError> {
        self.inner.head(path).await
    }

    async fn put(&self, _entry: CacheEntry) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.delete(path).await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_keys().await
    }

    async fn load_baseline(&self) -> Result<Option<Manifest>, StoreError> {
        self.inner.load_baseline().await
    }

    async fn save_baseline(&self, manifest: &Manifest) -> Result<(), StoreError> {
        self.inner.save_baseline(manifest).await
    }

    async fn clear_baseline(&self) -> Result<(), StoreError> {
        self.inner.clear_baseline().await
    }
}

#[tokio::test]
async fn store_failure_is_fatal_and_leaves_existing_entries() {
    let inner = MemoryStore::new();
    inner
        .insert_raw(CacheEntry::new("old", hash("O"), b"O".to_vec()))
        .unwrap();
    let store = Arc::new(BrokenStore { inner });
    let source: Arc<dyn AssetSource> = Arc::new(MapSource::serving(&[("a", "A")]));
    let cache: Arc<dyn CacheStore> = store.clone();
    let err = Reconciler::new(cache, source, options())
        .reconcile(None, &manifest("v1", &[("a", "A")]))
        .await
        .expect_err("store failure");
    assert_eq!(err.code(), "ST202");
    assert_eq!(store.list_keys().await.unwrap(), vec!["old".to_string()]);
    assert!(store.load_baseline().await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_pass_skips_remaining_work() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(CacheEntry::new("orphan", hash("O"), b"O".to_vec()))
        .await
        .unwrap();
    let source = Arc::new(MapSource::serving(&[("a", "A"), ("b", "B")]));
    let reconciler = reconciler(&store, &source);
    reconciler.cancellation().cancel();
    let report = reconciler
        .reconcile(None, &manifest("v1", &[("a", "A"), ("b", "B")]))
        .await
        .expect("reconcile");
    assert!(report.cancelled);
    assert_eq!(report.skipped, vec!["a".to_string(), "b".to_string()]);
    assert!(report.evicted.is_empty());
    assert!(!report.baseline_saved);
    assert!(store.get("orphan").await.unwrap().is_some());
    assert!(store.load_baseline().await.unwrap().is_none());
}

#[tokio::test]
async fn pass_after_cancelled_one_runs_to_completion() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A"), ("b", "B")]));
    let reconciler = reconciler(&store, &source);
    let v1 = manifest("v1", &[("a", "A")]);
    reconciler.cancellation().cancel();
    let report = reconciler.reconcile(None, &v1).await.expect("cancelled");
    assert!(report.cancelled);

    let v2 = manifest("v2", &[("a", "A"), ("b", "B")]);
    let report = reconciler.reconcile(None, &v2).await.expect("second");
    assert!(!report.cancelled);
    assert!(report.skipped.is_empty());
    assert_eq!(report.added, vec!["a".to_string(), "b".to_string()]);
    assert!(report.baseline_saved);
    assert_eq!(store.load_baseline().await.unwrap(), Some(v2));
    assert!(!reconciler.cancellation().is_cancelled());
}

#[tokio::test]
async fn cancel_mid_pass_keeps_stored_entries_and_skips_the_rest() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(CacheEntry::new("orphan", hash("O"), b"O".to_vec()))
        .await
        .unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(MapSource {
        gate: Some(Arc::clone(&gate)),
        ..MapSource::default()
    });
    let assets = [("a", "A"), ("b", "B"), ("c", "C"), ("d", "D")];
    source.serve(&assets);
    let mut opts = options();
    opts.concurrency = 1;
    let reconciler = Arc::new(reconciler_with(&store, &source, opts));
    let target = manifest("v1", &assets);

    let running = {
        let reconciler = Arc::clone(&reconciler);
        let target = target.clone();
        tokio::spawn(async move { reconciler.reconcile(None, &target).await })
    };

    // Let exactly one fetch through and wait until it is stored.
    gate.add_permits(1);
    while store.len().unwrap() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    // The next fetch has started and is parked on the gate.
    while source.in_flight.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    reconciler.cancellation().cancel();
    gate.add_permits(assets.len());

    let report = running.await.expect("join").expect("reconcile");
    assert!(report.cancelled);
    assert_eq!(report.added.len(), 2, "stored and in-flight fetches commit");
    assert_eq!(report.skipped.len(), 2, "fetches not yet started are skipped");
    assert!(report.failures.is_empty());
    for path in &report.added {
        let entry = store.get(path).await.unwrap().expect("stored entry kept");
        assert!(entry.is_intact());
    }
    for path in &report.skipped {
        assert!(store.get(path).await.unwrap().is_none());
        assert_eq!(source.calls(path), 0);
    }
    assert!(report.evicted.is_empty());
    assert!(store.get("orphan").await.unwrap().is_some());
    assert!(!report.baseline_saved);
    assert!(store.load_baseline().await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_pass_on_same_store_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(MapSource {
        gate: Some(Arc::clone(&gate)),
        ..MapSource::default()
    });
    source.serve(&[("a", "A")]);
    let first = Arc::new(reconciler(&store, &source));
    let target = manifest("v1", &[("a", "A")]);

    let running = {
        let first = Arc::clone(&first);
        let target = target.clone();
        tokio::spawn(async move { first.reconcile(None, &target).await })
    };
    while source.in_flight.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let second = reconciler(&store, &source);
    let err = second
        .try_reconcile(None, &target)
        .await
        .expect_err("busy");
    assert!(matches!(err, ReconcileError::Busy { .. }));
    assert_eq!(err.code(), "ST400");

    gate.add_permits(1);
    let report = running.await.expect("join").expect("first pass");
    assert_eq!(report.added, vec!["a".to_string()]);
    let report = second
        .try_reconcile(Some(&target), &target)
        .await
        .expect("free again");
    assert_eq!(report.changed(), 0);
}

#[tokio::test]
async fn deep_verify_refetches_damaged_payloads() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_raw(CacheEntry::new("a", hash("A"), b"bit rot".to_vec()))
        .unwrap();
    let source = Arc::new(MapSource::serving(&[("a", "A")]));
    let current = manifest("v1", &[("a", "A")]);
    store.save_baseline(&current).await.unwrap();

    let shallow = reconciler(&store, &source)
        .reconcile(Some(&current), &current)
        .await
        .expect("shallow");
    assert_eq!(shallow.changed(), 0);

    let mut opts = options();
    opts.deep_verify = true;
    let deep = reconciler_with(&store, &source, opts)
        .reconcile_from_baseline(&current, true)
        .await
        .expect("deep");
    assert_eq!(deep.refetched, vec!["a".to_string()]);
    assert!(store.get("a").await.unwrap().expect("entry").is_intact());
}

#[tokio::test]
async fn same_version_with_new_entries_runs_full_pass() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A"), ("b", "B")]));
    let reconciler = reconciler(&store, &source);
    let first = manifest("v1", &[("a", "A")]);
    reconciler.reconcile(None, &first).await.expect("first");

    let republished = manifest("v1", &[("a", "A"), ("b", "B")]);
    let report = reconciler
        .reconcile_from_baseline(&republished, true)
        .await
        .expect("republished");
    assert!(report.inconsistent_baseline);
    assert_eq!(report.pass, PassKind::Full);
    assert_eq!(report.added, vec!["b".to_string()]);
}

#[tokio::test]
async fn plan_is_a_dry_run() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MapSource::serving(&[("a", "A")]));
    let plan = reconciler(&store, &source)
        .plan(None, &manifest("v1", &[("a", "A")]))
        .await
        .expect("plan");
    assert_eq!(plan.added(), 1);
    assert!(store.is_empty().unwrap());
    assert_eq!(source.calls("a"), 0);
}

#[tokio::test]
async fn verify_store_finds_and_removes_damage() {
    let store = MemoryStore::new();
    store
        .insert_raw(CacheEntry::new("good", hash("G"), b"G".to_vec()))
        .unwrap();
    store
        .insert_raw(CacheEntry::new("bad", hash("B"), b"not B".to_vec()))
        .unwrap();

    let report = verify_store(&store, false).await.expect("verify");
    assert_eq!(report.checked, 2);
    assert_eq!(report.corrupt, vec!["bad".to_string()]);
    assert!(report.removed.is_empty());

    let report = verify_store(&store, true).await.expect("repair");
    assert_eq!(report.removed, vec!["bad".to_string()]);
    assert_eq!(store.list_keys().await.unwrap(), vec!["good".to_string()]);
}
