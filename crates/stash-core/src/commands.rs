//! Command handlers behind the CLI.
//!
//! Each handler returns an [`ExecutionOutcome`]; expected failures (bad
//! input, busy store, partial failures) become user errors or failures with
//! structured details rather than `Err`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use stash_domain::{load_manifest, render_json, render_script, Manifest, ManifestError};
use tracing::debug;

use crate::config::Config;
use crate::outcome::ExecutionOutcome;
use crate::reconcile::{
    load_baseline_lenient, plan_against_store, verify_store, ReconcileError, ReconcileOptions,
    ReconcileReport, Reconciler,
};
use crate::source::{AssetSource, DirSource, HttpSource};
use crate::store::{CacheStore, FsStore, StoreError};

#[derive(Debug, Clone)]
pub enum SourceSpec {
    Dir(PathBuf),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub manifest: PathBuf,
    pub source: SourceSpec,
    pub store: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub attempts: Option<u32>,
    pub deep_verify: bool,
    /// Wait for a running pass instead of reporting the store as busy.
    pub wait: bool,
}

#[derive(Debug, Clone)]
pub struct StatusRequest {
    pub manifest: PathBuf,
    pub store: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub store: Option<PathBuf>,
    pub repair: bool,
}

#[derive(Debug, Clone)]
pub struct ManifestCheckRequest {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ManifestRenderRequest {
    pub path: PathBuf,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct CacheClearRequest {
    pub store: Option<PathBuf>,
}

pub async fn reconcile_assets(
    config: &Config,
    request: &ReconcileRequest,
) -> anyhow::Result<ExecutionOutcome> {
    let manifest = match load_manifest(&request.manifest) {
        Ok(manifest) => manifest,
        Err(err) => return Ok(manifest_outcome(&request.manifest, &err)),
    };
    let options = match reconcile_options(config.reconcile(), request) {
        Ok(options) => options,
        Err(message) => return Ok(ExecutionOutcome::user_error(message, json!({}))),
    };
    let source = match open_source(config, &request.source) {
        Ok(source) => source,
        Err(outcome) => return Ok(outcome),
    };
    let store_path = store_path(config, request.store.as_deref());
    let store = match FsStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => return Ok(store_outcome(&store_path, &err)),
    };

    debug!(
        manifest = %request.manifest.display(),
        store = %store_path.display(),
        source = %source.describe(),
        "starting reconcile"
    );
    let reconciler = Reconciler::new(Arc::new(store), source, options);
    match reconciler
        .reconcile_from_baseline(&manifest, request.wait)
        .await
    {
        Ok(report) => Ok(report_outcome(&store_path, &report)),
        Err(err) => Ok(reconcile_error_outcome(&store_path, &err)),
    }
}

pub async fn status(config: &Config, request: &StatusRequest) -> anyhow::Result<ExecutionOutcome> {
    let manifest = match load_manifest(&request.manifest) {
        Ok(manifest) => manifest,
        Err(err) => return Ok(manifest_outcome(&request.manifest, &err)),
    };
    let store_path = store_path(config, request.store.as_deref());
    let store = match FsStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => return Ok(store_outcome(&store_path, &err)),
    };
    let baseline = match load_baseline_lenient(&store).await {
        Ok(baseline) => baseline,
        Err(err) => return Ok(store_outcome(&store_path, &err)),
    };
    let plan = match plan_against_store(
        &store,
        baseline.as_ref(),
        &manifest,
        config.reconcile().deep_verify,
    )
    .await
    {
        Ok(plan) => plan,
        Err(err) => return Ok(reconcile_error_outcome(&store_path, &err)),
    };

    let baseline_version = baseline.as_ref().map(|baseline| baseline.version.clone());
    let up_to_date =
        plan.is_noop() && baseline_version.as_deref() == Some(manifest.version.as_str());
    let message = if up_to_date {
        format!("cache is up to date with {}", manifest.version)
    } else {
        format!(
            "{} to fetch, {} to evict, {} unchanged",
            plan.fetch.len(),
            plan.evict.len(),
            plan.unchanged.len()
        )
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "store": store_path.display().to_string(),
            "version": manifest.version,
            "baseline_version": baseline_version,
            "up_to_date": up_to_date,
            "plan": plan,
        }),
    ))
}

pub async fn verify(config: &Config, request: &VerifyRequest) -> anyhow::Result<ExecutionOutcome> {
    let store_path = store_path(config, request.store.as_deref());
    let store = match FsStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => return Ok(store_outcome(&store_path, &err)),
    };
    let report = match verify_store(&store, request.repair).await {
        Ok(report) => report,
        Err(err) => return Ok(reconcile_error_outcome(&store_path, &err)),
    };
    let details = json!({
        "store": store_path.display().to_string(),
        "checked": report.checked,
        "corrupt": report.corrupt,
        "removed": report.removed,
    });
    if report.corrupt.is_empty() {
        Ok(ExecutionOutcome::success(
            format!("{} cached assets verified", report.checked),
            details,
        ))
    } else if request.repair {
        Ok(ExecutionOutcome::success(
            format!(
                "removed {} damaged assets; the next reconcile will fetch them again",
                report.removed.len()
            ),
            details,
        ))
    } else {
        Ok(ExecutionOutcome::failure(
            format!(
                "{} of {} cached assets are damaged",
                report.corrupt.len(),
                report.checked
            ),
            with_hint(details, "Re-run with --repair to drop them."),
        ))
    }
}

pub fn manifest_check(request: &ManifestCheckRequest) -> anyhow::Result<ExecutionOutcome> {
    match load_manifest(&request.path) {
        Ok(manifest) => {
            let summary = manifest.summary();
            Ok(ExecutionOutcome::success(
                format!(
                    "manifest {} lists {} assets",
                    summary.version, summary.assets
                ),
                json!({
                    "path": request.path.display().to_string(),
                    "summary": summary,
                }),
            ))
        }
        Err(err) => Ok(manifest_outcome(&request.path, &err)),
    }
}

pub fn manifest_render(request: &ManifestRenderRequest) -> anyhow::Result<ExecutionOutcome> {
    let manifest = match load_manifest(&request.path) {
        Ok(manifest) => manifest,
        Err(err) => return Ok(manifest_outcome(&request.path, &err)),
    };
    let (rendered, format) = if request.json {
        (render_json(&manifest).map(|json| json + "\n"), "json")
    } else {
        (render_script(&manifest), "script")
    };
    match rendered {
        Ok(text) => Ok(ExecutionOutcome::success(
            text,
            json!({ "passthrough": true, "format": format }),
        )),
        Err(err) => Ok(manifest_outcome(&request.path, &err)),
    }
}

pub async fn cache_clear(
    config: &Config,
    request: &CacheClearRequest,
) -> anyhow::Result<ExecutionOutcome> {
    let store_path = store_path(config, request.store.as_deref());
    let store = match FsStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => return Ok(store_outcome(&store_path, &err)),
    };
    match clear_store(&store).await {
        Ok(removed) => Ok(ExecutionOutcome::success(
            format!("removed {removed} cached assets"),
            json!({
                "store": store_path.display().to_string(),
                "removed": removed,
            }),
        )),
        Err(err) => Ok(reconcile_error_outcome(&store_path, &err)),
    }
}

async fn clear_store(store: &FsStore) -> Result<usize, ReconcileError> {
    let _lease = store.lock().await?;
    let mut removed = 0;
    for key in store.list_keys().await? {
        if store.delete(&key).await? {
            removed += 1;
        }
    }
    store.clear_baseline().await?;
    Ok(removed)
}

fn reconcile_options(
    defaults: &ReconcileOptions,
    request: &ReconcileRequest,
) -> Result<ReconcileOptions, String> {
    let mut options = defaults.clone();
    if let Some(concurrency) = request.concurrency {
        if concurrency == 0 {
            return Err("--concurrency must be at least 1".to_string());
        }
        options.concurrency = concurrency;
    }
    if let Some(timeout_ms) = request.timeout_ms {
        if timeout_ms == 0 {
            return Err("--timeout-ms must be at least 1".to_string());
        }
        options.fetch_timeout = Duration::from_millis(timeout_ms);
    }
    if let Some(attempts) = request.attempts {
        if attempts == 0 {
            return Err("--attempts must be at least 1".to_string());
        }
        options.retry.max_attempts = attempts;
    }
    options.deep_verify |= request.deep_verify;
    Ok(options)
}

fn open_source(
    config: &Config,
    origin: &SourceSpec,
) -> Result<Arc<dyn AssetSource>, ExecutionOutcome> {
    match origin {
        SourceSpec::Dir(root) => {
            if !root.is_dir() {
                return Err(ExecutionOutcome::user_error(
                    format!("source directory {} does not exist", root.display()),
                    json!({ "source": root.display().to_string() }),
                ));
            }
            Ok(Arc::new(DirSource::new(root.clone())))
        }
        SourceSpec::Url(base) => {
            if !config.network().online {
                return Err(ExecutionOutcome::user_error(
                    "network access is disabled",
                    json!({
                        "reason": "offline",
                        "source": base,
                        "hint": "Unset STASH_ONLINE=0 or reconcile from --source-dir.",
                    }),
                ));
            }
            HttpSource::new(base, config.network().keep_proxies)
                .map(|source| Arc::new(source) as Arc<dyn AssetSource>)
                .map_err(|err| {
                    ExecutionOutcome::user_error(
                        format!("{err:#}"),
                        json!({ "source": base }),
                    )
                })
        }
    }
}

fn store_path(config: &Config, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| config.store().path.clone(), Path::to_path_buf)
}

fn report_outcome(store: &Path, report: &ReconcileReport) -> ExecutionOutcome {
    let mut details = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut details {
        map.insert(
            "store".to_string(),
            Value::String(store.display().to_string()),
        );
    }
    if report.cancelled {
        return ExecutionOutcome::failure(
            format!(
                "reconcile of {} cancelled; {} fetches skipped",
                report.version,
                report.skipped.len()
            ),
            details,
        );
    }
    if !report.failures.is_empty() {
        return ExecutionOutcome::failure(
            format!(
                "reconciled {} with {} failed assets",
                report.version,
                report.failures.len()
            ),
            with_hint(
                details,
                "Failed assets were left as they were; re-run reconcile to retry them.",
            ),
        );
    }
    ExecutionOutcome::success(
        format!(
            "reconciled {}: {} added, {} refetched, {} evicted, {} unchanged",
            report.version,
            report.added.len(),
            report.refetched.len(),
            report.evicted.len(),
            report.unchanged
        ),
        details,
    )
}

fn manifest_outcome(path: &Path, err: &ManifestError) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        err.to_string(),
        json!({
            "code": err.code(),
            "manifest": path.display().to_string(),
        }),
    )
}

fn store_outcome(store: &Path, err: &StoreError) -> ExecutionOutcome {
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "code": err.code(),
            "store": store.display().to_string(),
        }),
    )
}

fn reconcile_error_outcome(store: &Path, err: &ReconcileError) -> ExecutionOutcome {
    let details = json!({
        "code": err.code(),
        "store": store.display().to_string(),
    });
    match err {
        ReconcileError::Manifest(_) => ExecutionOutcome::user_error(err.to_string(), details),
        ReconcileError::Busy { .. } => ExecutionOutcome::user_error(
            err.to_string(),
            with_hint(details, "Wait for the running pass or drop --no-wait."),
        ),
        ReconcileError::Store(_) | ReconcileError::Worker(_) => ExecutionOutcome::failure(
            err.to_string(),
            with_hint(
                details,
                "The store may be inconsistent; run a full reconcile once it is reachable.",
            ),
        ),
    }
}

fn with_hint(mut details: Value, hint: &str) -> Value {
    if let Value::Object(map) = &mut details {
        map.insert("hint".to_string(), Value::String(hint.to_string()));
    }
    details
}

/// Version of the baseline recorded in the store at `path`, if any.
pub async fn baseline_version(path: &Path) -> anyhow::Result<Option<String>> {
    let store = FsStore::open(path)?;
    Ok(load_baseline_lenient(&store)
        .await?
        .map(|manifest: Manifest| manifest.version))
}
