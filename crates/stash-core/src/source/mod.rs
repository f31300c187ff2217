//! Where asset payloads come from.

use async_trait::async_trait;

mod dir;
mod http;

pub use dir::DirSource;
pub use http::HttpSource;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("[ST300] {path} was not found at the source")]
    NotFound { path: String },
    #[error("[ST301] request for {path} failed with HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("[ST302] failed to fetch {path}: {reason}")]
    Transport { path: String, reason: String },
    #[error("[ST303] fetching {path} timed out after {timeout_ms}ms")]
    Timeout { path: String, timeout_ms: u64 },
    #[error("[ST304] refusing to fetch unsafe asset path '{path}'")]
    UnsafePath { path: String },
}

impl FetchError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "ST300",
            Self::Status { .. } => "ST301",
            Self::Transport { .. } => "ST302",
            Self::Timeout { .. } => "ST303",
            Self::UnsafePath { .. } => "ST304",
        }
    }

    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 408 | 429) || *status >= 500,
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::NotFound { .. } | Self::UnsafePath { .. } => false,
        }
    }
}

#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Human-readable origin, for logs and reports.
    fn describe(&self) -> String;

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Reject asset paths that could escape the source root.
pub(crate) fn check_relative(path: &str) -> Result<(), FetchError> {
    let unsafe_path = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || has_drive_prefix(path)
        || path.split('/').any(|segment| segment == "..");
    if unsafe_path {
        return Err(FetchError::UnsafePath {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// `c:` style prefixes, which `Path::join` treats as absolute on Windows.
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
