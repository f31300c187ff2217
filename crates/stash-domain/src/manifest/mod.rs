//! Published asset manifests.
//!
//! A manifest lists every deployed asset path together with the integrity
//! digest of its content, plus an opaque version token that changes whenever
//! the list or any digest changes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::integrity::{Integrity, IntegrityError};

mod io;

pub use io::{load_manifest, parse_manifest, render_json, render_script, MANIFEST_GLOBAL};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("[ST100] manifest could not be parsed: {0}")]
    Parse(String),
    #[error("[ST101] manifest lists '{path}' more than once")]
    DuplicatePath { path: String },
    #[error("[ST102] manifest entry #{index} has an empty url")]
    EmptyPath { index: usize },
    #[error("[ST103] manifest entry '{path}' has an invalid hash: {source}")]
    InvalidHash {
        path: String,
        #[source]
        source: IntegrityError,
    },
    #[error("[ST104] manifest version is empty")]
    EmptyVersion,
    #[error("[ST105] failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "ST100",
            Self::DuplicatePath { .. } => "ST101",
            Self::EmptyPath { .. } => "ST102",
            Self::InvalidHash { .. } => "ST103",
            Self::EmptyVersion => "ST104",
            Self::Io { .. } => "ST105",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Relative URL of the asset, forward-slash separated.
    pub path: String,
    pub hash: Integrity,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, hash: Integrity) -> Self {
        Self {
            path: path.into(),
            hash,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(version: impl Into<String>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            version: version.into(),
            entries,
        }
    }

    /// Check the structural invariants every published manifest must hold.
    ///
    /// Digest syntax is enforced when entries are built, so only the path set
    /// and the version token remain to be checked here.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.version.trim().is_empty() {
            return Err(ManifestError::EmptyVersion);
        }
        let mut seen = HashSet::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.path.is_empty() {
                return Err(ManifestError::EmptyPath { index });
            }
            if !seen.insert(entry.path.as_str()) {
                return Err(ManifestError::DuplicatePath {
                    path: entry.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Map of path to declared digest.
    #[must_use]
    pub fn path_index(&self) -> HashMap<&str, &Integrity> {
        self.entries
            .iter()
            .map(|entry| (entry.path.as_str(), &entry.hash))
            .collect()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// Returns `true` when both manifests declare the same (path, hash) set,
    /// ignoring order and version.
    #[must_use]
    pub fn same_entries(&self, other: &Manifest) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        let index = other.path_index();
        self.entries
            .iter()
            .all(|entry| index.get(entry.path.as_str()) == Some(&&entry.hash))
    }

    #[must_use]
    pub fn summary(&self) -> ManifestSummary {
        let mut algorithms: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.hash.algorithm().to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        algorithms.sort();
        ManifestSummary {
            version: self.version.clone(),
            assets: self.entries.len(),
            algorithms,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ManifestSummary {
    pub version: String,
    pub assets: usize,
    pub algorithms: Vec<String>,
}
