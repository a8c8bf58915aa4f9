//! Idempotent write retry (§4.3): absorbs `Conflict`, surfaces anything else.
//!
//! Read-modify-write callers embed the re-read inside `f` itself — each
//! retry attempt re-executes `f` from scratch (read, build patch, apply,
//! inspect the conflict), driven by `tokio_retry::RetryIf` and reusing the
//! same jittered backoff as the wait engine.

use crate::backoff::{step_count, Backoff, BackoffConfig};
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retries `f` while it fails with `Error::Conflict`, backing off between
/// attempts. Any other error is terminal. Exhausting the backoff budget
/// (derived from `timeout` the same way the wait engine derives its step
/// count) surfaces `Error::Timeout` wrapping the kind/name, not the raw
/// conflict.
pub async fn retry<T, Fut, F>(
    kind: &'static str,
    name: &str,
    f: F,
    cfg: &BackoffConfig,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let steps = step_count(cfg, timeout) as usize;
    let strategy = Backoff::new(cfg).take(steps.max(1));

    let attempt = tokio_retry::RetryIf::spawn(strategy, f, |e: &Error| e.is_conflict());

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(kind, name.to_string())),
        result = attempt => result.map_err(|e| {
            if e.is_conflict() {
                Error::Timeout(kind, name.to_string())
            } else {
                e
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_cfg() -> BackoffConfig {
        BackoffConfig {
            operator_delay: Duration::from_millis(0),
            initial_delay: Duration::from_millis(1),
            factor: 1.2,
            max_delay: Duration::from_millis(10),
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_ok() {
        let cancel = CancellationToken::new();
        let result = retry(
            "Thing",
            "x",
            || async { Ok::<_, Error>(42) },
            &fast_cfg(),
            Duration::from_secs(1),
            &cancel,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_through_conflicts_then_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = attempts.clone();
        let cancel = CancellationToken::new();
        let result = retry(
            "Thing",
            "x",
            move || {
                let attempts = attempts2.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Err(Error::Conflict("Thing", "x".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            &fast_cfg(),
            Duration::from_secs(1),
            &cancel,
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn non_conflict_error_is_terminal() {
        let cancel = CancellationToken::new();
        let result: Result<()> = retry(
            "Thing",
            "x",
            || async { Err(Error::NotHolder("Thing", "bob".into(), "x".into())) },
            &fast_cfg(),
            Duration::from_secs(1),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(Error::NotHolder(..))));
    }
}
