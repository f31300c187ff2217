use serde::Serialize;
use stash_domain::{Integrity, PassKind};

use crate::source::FetchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The source served bytes whose digest differs from the manifest.
    IntegrityMismatch,
    /// The source could not serve the asset within the retry budget.
    FetchFailure,
}

/// An asset that could not be brought up to date during a pass.
#[derive(Clone, Debug, Serialize)]
pub struct AssetFailure {
    pub path: String,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl AssetFailure {
    pub(crate) fn integrity(
        path: &str,
        expected: &Integrity,
        actual: &Integrity,
        attempts: u32,
    ) -> Self {
        Self {
            path: path.to_string(),
            kind: FailureKind::IntegrityMismatch,
            message: format!("[ST310] {path} hashed to {actual}, expected {expected}"),
            attempts,
            code: Some("ST310"),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
        }
    }

    pub(crate) fn fetch(path: &str, err: &FetchError, attempts: u32) -> Self {
        Self {
            path: path.to_string(),
            kind: FailureKind::FetchFailure,
            message: err.to_string(),
            attempts,
            code: Some(err.code()),
            expected: None,
            actual: None,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcileReport {
    pub version: String,
    pub pass: PassKind,
    /// Paths that were absent and are now stored.
    pub added: Vec<String>,
    /// Paths whose stale or damaged copy was replaced.
    pub refetched: Vec<String>,
    pub evicted: Vec<String>,
    pub unchanged: usize,
    pub failures: Vec<AssetFailure>,
    /// Planned fetches not started because the pass was cancelled.
    pub skipped: Vec<String>,
    pub bytes_fetched: u64,
    pub inconsistent_baseline: bool,
    pub cancelled: bool,
    pub baseline_saved: bool,
}

impl ReconcileReport {
    pub(crate) fn new(version: &str, pass: PassKind) -> Self {
        Self {
            version: version.to_string(),
            pass,
            added: Vec::new(),
            refetched: Vec::new(),
            evicted: Vec::new(),
            unchanged: 0,
            failures: Vec::new(),
            skipped: Vec::new(),
            bytes_fetched: 0,
            inconsistent_baseline: false,
            cancelled: false,
            baseline_saved: false,
        }
    }

    /// True when every manifest entry is now current in the store.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    #[must_use]
    pub fn changed(&self) -> usize {
        self.added.len() + self.refetched.len() + self.evicted.len()
    }

    pub(crate) fn sort(&mut self) {
        self.added.sort();
        self.refetched.sort();
        self.evicted.sort();
        self.skipped.sort();
        self.failures.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

/// Outcome of a standalone store integrity check.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub corrupt: Vec<String>,
    pub removed: Vec<String>,
}
