use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{check_relative, AssetSource, FetchError};

/// Reads assets from a local directory laid out like the published site.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetSource for DirSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        check_relative(path)?;
        let file = path
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(FetchError::NotFound {
                path: path.to_string(),
            }),
            Err(err) => Err(FetchError::Transport {
                path: path.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}
