#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod integrity;
pub mod manifest;
pub mod plan;

pub use integrity::{DigestAlgorithm, Integrity, IntegrityError};
pub use manifest::{
    load_manifest, parse_manifest, render_json, render_script, Manifest, ManifestEntry,
    ManifestError, ManifestSummary, MANIFEST_GLOBAL,
};
pub use plan::{plan_reconcile, FetchReason, PassKind, PlannedFetch, ReconcilePlan};
