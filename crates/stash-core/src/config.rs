//! Environment-driven settings shared by every command.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::reconcile::{ReconcileOptions, RetryPolicy};

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(self.vars.get(key).map(String::as_str), Some("1"))
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) store: StoreConfig,
    pub(crate) network: NetworkConfig,
    pub(crate) reconcile: ReconcileOptions,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if the store path cannot be resolved or a numeric
    /// setting does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> anyhow::Result<Self> {
        let defaults = ReconcileOptions::default();
        let concurrency: usize = parse_var(snapshot, "STASH_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(anyhow!("STASH_CONCURRENCY must be at least 1"));
        }
        let max_attempts: u32 =
            parse_var(snapshot, "STASH_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(anyhow!("STASH_MAX_ATTEMPTS must be at least 1"));
        }
        let timeout_ms: u64 = parse_var(
            snapshot,
            "STASH_FETCH_TIMEOUT_MS",
            duration_ms(defaults.fetch_timeout),
        )?;
        let backoff_ms: u64 = parse_var(
            snapshot,
            "STASH_BACKOFF_MS",
            duration_ms(defaults.retry.initial_backoff),
        )?;

        Ok(Self {
            store: resolve_store_path(snapshot)?,
            network: NetworkConfig {
                online: match snapshot.var("STASH_ONLINE") {
                    Some(value) => {
                        let lowered = value.to_ascii_lowercase();
                        !matches!(lowered.as_str(), "0" | "false" | "no" | "off" | "")
                    }
                    None => true,
                },
                keep_proxies: keep_proxies(snapshot),
            },
            reconcile: ReconcileOptions {
                concurrency,
                fetch_timeout: Duration::from_millis(timeout_ms),
                retry: RetryPolicy {
                    max_attempts,
                    initial_backoff: Duration::from_millis(backoff_ms),
                    ..defaults.retry
                },
                deep_verify: snapshot.flag_is_enabled("STASH_DEEP_VERIFY"),
            },
        })
    }

    #[must_use]
    pub fn store(&self) -> &StoreConfig {
        &self.store
    }

    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    #[must_use]
    pub fn reconcile(&self) -> &ReconcileOptions {
        &self.reconcile
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Where `path` came from: the env var name or `"default"`.
    pub source: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub online: bool,
    pub keep_proxies: bool,
}

fn resolve_store_path(snapshot: &EnvSnapshot) -> anyhow::Result<StoreConfig> {
    if let Some(raw) = snapshot.var("STASH_STORE_PATH").filter(|raw| !raw.is_empty()) {
        let path = PathBuf::from(raw);
        let path = if path.is_absolute() {
            path
        } else {
            env::current_dir()
                .context("unable to determine current directory")?
                .join(path)
        };
        return Ok(StoreConfig {
            path,
            source: "STASH_STORE_PATH",
        });
    }
    let base = dirs_next::cache_dir()
        .ok_or_else(|| anyhow!("unable to determine the user cache directory"))?;
    Ok(StoreConfig {
        path: base.join("stash").join("store"),
        source: "default",
    })
}

fn parse_var<T>(snapshot: &EnvSnapshot, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match snapshot.var(key).map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .parse()
            .with_context(|| format!("invalid {key} value '{raw}'")),
        _ => Ok(default),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Decide whether HTTP clients should honor standard proxy environment variables.
///
/// - `STASH_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `STASH_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are enabled only when at least one proxy env var is set.
fn keep_proxies(snapshot: &EnvSnapshot) -> bool {
    match snapshot.var("STASH_KEEP_PROXIES") {
        Some(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        }
        None => {
            const PROXY_KEYS: &[&str] = &[
                "HTTP_PROXY",
                "http_proxy",
                "HTTPS_PROXY",
                "https_proxy",
                "ALL_PROXY",
                "all_proxy",
                "NO_PROXY",
                "no_proxy",
            ];
            PROXY_KEYS.iter().any(|key| {
                snapshot
                    .var(key)
                    .is_some_and(|value| !value.trim().is_empty())
            })
        }
    }
}
