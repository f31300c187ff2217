#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod commands;
pub mod config;
pub mod outcome;
pub mod reconcile;
pub mod source;
pub mod store;

pub use commands::{
    baseline_version, cache_clear, manifest_check, manifest_render, reconcile_assets, status,
    verify, CacheClearRequest, ManifestCheckRequest, ManifestRenderRequest, ReconcileRequest,
    SourceSpec, StatusRequest, VerifyRequest,
};
pub use config::{Config, NetworkConfig, StoreConfig};
pub use outcome::{
    format_status_message, to_json_response, CommandInfo, CommandStatus, ExecutionOutcome,
};
pub use reconcile::{
    plan_against_store, verify_store, AssetFailure, Cancellation, FailureKind, ReconcileError,
    ReconcileOptions, ReconcileReport, Reconciler, RetryPolicy, VerifyReport,
};
pub use source::{AssetSource, DirSource, FetchError, HttpSource};
pub use store::{
    CacheEntry, CacheStore, FsStore, MemoryStore, StoreError, StoreLease, StoredAsset,
};
