//! Pure reconciliation planning.
//!
//! Given the manifest to converge on and a snapshot of what the cache holds,
//! decide which paths to fetch, which to evict, and which are already current.
//! Nothing here touches a store or the network.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::integrity::Integrity;
use crate::manifest::Manifest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    /// No baseline, or the baseline carries a different version.
    Full,
    /// The baseline already has this version; the pass only repairs drift.
    Verify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchReason {
    Missing,
    Stale,
    Corrupt,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannedFetch {
    pub path: String,
    pub hash: Integrity,
    pub reason: FetchReason,
}

impl PlannedFetch {
    /// Whether an older copy of this path is present and must stay readable
    /// until the replacement is verified.
    #[must_use]
    pub fn replaces_existing(&self) -> bool {
        !matches!(self.reason, FetchReason::Missing)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReconcilePlan {
    pub pass: PassKind,
    pub version: String,
    /// Baseline shares the version but declares different entries.
    pub inconsistent_baseline: bool,
    /// In manifest order.
    pub fetch: Vec<PlannedFetch>,
    /// Sorted.
    pub evict: Vec<String>,
    /// In manifest order.
    pub unchanged: Vec<String>,
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.fetch.is_empty() && self.evict.is_empty()
    }

    #[must_use]
    pub fn added(&self) -> usize {
        self.fetch
            .iter()
            .filter(|fetch| !fetch.replaces_existing())
            .count()
    }

    #[must_use]
    pub fn refetched(&self) -> usize {
        self.fetch
            .iter()
            .filter(|fetch| fetch.replaces_existing())
            .count()
    }
}

/// Build the plan that converges `cached` on `new`.
///
/// `cached` maps every stored path to the digest recorded with it. `corrupt`
/// names stored paths whose payload no longer hashes to that digest; they are
/// re-fetched even when the recorded digest matches the manifest.
pub fn plan_reconcile(
    old: Option<&Manifest>,
    new: &Manifest,
    cached: &HashMap<String, Integrity>,
    corrupt: &HashSet<String>,
) -> ReconcilePlan {
    let (pass, inconsistent_baseline) = match old {
        Some(old) if old.version == new.version => {
            if old.same_entries(new) {
                (PassKind::Verify, false)
            } else {
                (PassKind::Full, true)
            }
        }
        _ => (PassKind::Full, false),
    };

    let mut fetch = Vec::new();
    let mut unchanged = Vec::new();
    for entry in &new.entries {
        let reason = match cached.get(&entry.path) {
            None => Some(FetchReason::Missing),
            Some(stored) if *stored != entry.hash => Some(FetchReason::Stale),
            Some(_) if corrupt.contains(&entry.path) => Some(FetchReason::Corrupt),
            Some(_) => None,
        };
        match reason {
            Some(reason) => {
                tracing::debug!(path = %entry.path, ?reason, "planned fetch");
                fetch.push(PlannedFetch {
                    path: entry.path.clone(),
                    hash: entry.hash.clone(),
                    reason,
                });
            }
            None => unchanged.push(entry.path.clone()),
        }
    }

    let wanted = new.path_index();
    let mut evict: Vec<String> = cached
        .keys()
        .filter(|path| !wanted.contains_key(path.as_str()))
        .cloned()
        .collect();
    evict.sort();

    ReconcilePlan {
        pass,
        version: new.version.clone(),
        inconsistent_baseline,
        fetch,
        evict,
        unchanged,
    }
}
