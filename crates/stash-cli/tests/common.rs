#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use assert_cmd::assert::Assert;
use serde_json::Value;
use stash_domain::{render_script, DigestAlgorithm, Integrity, Manifest, ManifestEntry};
use tempfile::TempDir;

/// A published site on disk plus a scratch store directory.
pub struct Site {
    pub temp: TempDir,
    pub root: PathBuf,
    pub store: PathBuf,
    pub manifest: PathBuf,
}

impl Site {
    pub fn new(prefix: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("tempdir");
        let root = temp.path().join("site");
        let store = temp.path().join("store");
        let manifest = temp.path().join("service-worker-assets.js");
        fs::create_dir_all(&root).expect("site dir");
        Self {
            temp,
            root,
            store,
            manifest,
        }
    }

    /// Write the asset files and a manifest listing them under `version`.
    pub fn publish(&self, version: &str, assets: &[(&str, &str)]) {
        for (path, body) in assets {
            let file = self.root.join(path);
            fs::create_dir_all(file.parent().expect("parent")).expect("asset dir");
            fs::write(file, body).expect("write asset");
        }
        let manifest = Manifest::new(
            version,
            assets
                .iter()
                .map(|(path, body)| {
                    ManifestEntry::new(
                        *path,
                        Integrity::compute(DigestAlgorithm::Sha256, body.as_bytes()),
                    )
                })
                .collect(),
        );
        fs::write(&self.manifest, render_script(&manifest).expect("render")).expect("manifest");
    }

    pub fn reconcile_args(&self) -> Vec<String> {
        vec![
            "reconcile".to_string(),
            "--manifest".to_string(),
            self.manifest.display().to_string(),
            "--source-dir".to_string(),
            self.root.display().to_string(),
            "--store".to_string(),
            self.store.display().to_string(),
        ]
    }

    pub fn entry_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.store.join("entries"))
            .expect("entries dir")
            .map(|entry| entry.expect("dirent").path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("entry"))
            .collect();
        files.sort();
        files
    }
}

pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("workspace root")
        .to_path_buf()
}

pub fn deployed_manifest() -> PathBuf {
    workspace_root()
        .join("crates")
        .join("stash-domain")
        .join("tests")
        .join("fixtures")
        .join("service-worker-assets.js")
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
