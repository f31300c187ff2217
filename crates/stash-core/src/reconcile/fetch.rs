use std::time::Duration;

use stash_domain::PlannedFetch;
use tracing::{debug, warn};

use super::{AssetFailure, Cancellation, ReconcileOptions};
use crate::source::{AssetSource, FetchError};

pub(crate) enum FetchOutcome {
    Verified { payload: Vec<u8>, attempts: u32 },
    Failed(AssetFailure),
    Cancelled,
}

/// Fetch one planned asset, retrying transient failures, and return its
/// payload only once it hashes to the declared digest.
pub(crate) async fn fetch_verified(
    source: &dyn AssetSource,
    planned: &PlannedFetch,
    options: &ReconcileOptions,
    cancel: &Cancellation,
) -> FetchOutcome {
    let max_attempts = options.retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }
        attempt += 1;
        let error = match tokio::time::timeout(options.fetch_timeout, source.fetch(&planned.path))
            .await
        {
            Ok(Ok(payload)) => {
                return match planned.hash.verify(&payload) {
                    Ok(()) => FetchOutcome::Verified {
                        payload,
                        attempts: attempt,
                    },
                    Err(actual) => {
                        warn!(
                            path = %planned.path,
                            expected = %planned.hash,
                            %actual,
                            "integrity mismatch"
                        );
                        FetchOutcome::Failed(AssetFailure::integrity(
                            &planned.path,
                            &planned.hash,
                            &actual,
                            attempt,
                        ))
                    }
                };
            }
            Ok(Err(err)) => err,
            Err(_) => FetchError::Timeout {
                path: planned.path.clone(),
                timeout_ms: u64::try_from(options.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        if !error.is_retryable() || attempt >= max_attempts {
            warn!(path = %planned.path, attempts = attempt, %error, "fetch failed");
            return FetchOutcome::Failed(AssetFailure::fetch(&planned.path, &error, attempt));
        }

        let delay = options.retry.delay_for(attempt);
        debug!(path = %planned.path, attempt, ?delay, %error, "retrying fetch");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => return FetchOutcome::Cancelled,
        }
    }
}

pub(crate) fn backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    initial.saturating_mul(1_u32 << exponent).min(max)
}
