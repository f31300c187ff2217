use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;
use url::Url;

use super::{check_relative, AssetSource, FetchError};

const USER_AGENT: &str = concat!("stash/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches assets relative to a base URL, bypassing intermediate caches.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base_url: &str, keep_proxies: bool) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("invalid base URL '{base_url}'"))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("base URL '{base_url}' must use http or https");
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT);
        let builder = if keep_proxies {
            builder
        } else {
            builder.no_proxy()
        };
        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client, base })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn asset_url(&self, path: &str) -> Result<Url, FetchError> {
        check_relative(path)?;
        let url = self.base.join(path).map_err(|_| FetchError::UnsafePath {
            path: path.to_string(),
        })?;
        if !url.as_str().starts_with(self.base.as_str()) {
            return Err(FetchError::UnsafePath {
                path: path.to_string(),
            });
        }
        Ok(url)
    }
}

#[async_trait]
impl AssetSource for HttpSource {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.asset_url(path)?;
        debug!(%url, "fetching asset");
        let transport = |err: reqwest::Error| FetchError::Transport {
            path: path.to_string(),
            reason: err.to_string(),
        };
        let response = self
            .client
            .get(url)
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}
