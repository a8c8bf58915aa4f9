//! Predicate convergence over a declarative, eventually-consistent store (§4.2).
//!
//! Generic over the entity type and over how the caller refetches it, so
//! each primitive engine supplies a small closure instead of this module
//! needing to know about every CRD kind. No runtime type assertions.

use crate::backoff::{step_count, Backoff, BackoffConfig};
use crate::error::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Splits a single `timeout` budget across two sequential phases (e.g. a
/// wait-for-unlockable phase followed by a CAS-retry phase): returns what's
/// left of `timeout` after `elapsed_since` has already passed, or
/// `Duration::ZERO` unchanged if `timeout` is the "no deadline" sentinel.
/// Errors with `Error::Timeout` if the budget is already exhausted, rather
/// than handing the second phase a fresh, unbounded copy of the same
/// duration.
pub(crate) fn remaining_budget(timeout: Duration, elapsed_since: Instant, kind: &'static str, name: &str) -> Result<Duration> {
    if timeout.is_zero() {
        return Ok(Duration::ZERO);
    }
    let remaining = timeout.saturating_sub(elapsed_since.elapsed());
    if remaining.is_zero() {
        return Err(Error::Timeout(kind, name.to_string()));
    }
    Ok(remaining)
}

/// Sleeps for `d`, or returns early if `cancel` fires. Returns `false` if
/// cancelled.
async fn sleep_or_cancel(d: Duration, cancel: &CancellationToken) -> bool {
    if d.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(d) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Waits for `predicate(obj)` to hold, refetching via `fetch` on a
/// jittered-backoff poll loop, after an initial operator-settle delay.
///
/// `fetch` returns `Ok(None)` for "not found yet, keep polling" (the entity
/// may still be materializing) and `Err(_)` for any other read error, which
/// is fatal and aborts the wait immediately.
pub async fn wait_for_condition<T, Fut, FetchFn, Pred>(
    kind: &'static str,
    name: &str,
    mut fetch: FetchFn,
    predicate: Pred,
    cfg: &BackoffConfig,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    FetchFn: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    Pred: Fn(&T) -> bool,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled(kind, name.to_string()));
    }
    if !sleep_or_cancel(cfg.operator_delay, cancel).await {
        return Err(Error::Cancelled(kind, name.to_string()));
    }

    let deadline = if timeout.is_zero() {
        None
    } else {
        Some(Instant::now() + timeout)
    };
    let max_steps = step_count(cfg, timeout);
    let mut backoff = Backoff::new(cfg);

    for _ in 0..max_steps {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(kind, name.to_string()));
        }

        if let Some(obj) = fetch().await? {
            if predicate(&obj) {
                return Ok(obj);
            }
        }

        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(Error::Timeout(kind, name.to_string()));
            }
        }

        let mut delay = backoff.next().unwrap_or(cfg.max_delay);
        if let Some(d) = deadline {
            delay = delay.min(d.saturating_duration_since(Instant::now()));
        }
        if !sleep_or_cancel(delay, cancel).await {
            return Err(Error::Cancelled(kind, name.to_string()));
        }
    }

    Err(Error::Timeout(kind, name.to_string()))
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
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_once_predicate_holds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let cancel = CancellationToken::new();
        let result = wait_for_condition(
            "Thing",
            "x",
            move || {
                let calls = calls2.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(n))
                }
            },
            |n: &usize| *n >= 3,
            &fast_cfg(),
            Duration::from_secs(1),
            &cancel,
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn not_found_keeps_polling_until_timeout() {
        let cancel = CancellationToken::new();
        let result: Result<()> = wait_for_condition(
            "Thing",
            "x",
            || async { Ok(None) },
            |_: &()| true,
            &fast_cfg(),
            Duration::from_millis(50),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout(..))));
    }

    #[tokio::test]
    async fn cancellation_is_reported() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = wait_for_condition(
            "Thing",
            "x",
            || async { Ok(None) },
            |_: &()| true,
            &fast_cfg(),
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled(..))));
    }

    #[tokio::test]
    async fn fatal_read_error_aborts_immediately() {
        let cancel = CancellationToken::new();
        let result: Result<()> = wait_for_condition(
            "Thing",
            "x",
            || async { Err(Error::Forbidden("nope".into())) },
            |_: &()| true,
            &fast_cfg(),
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }
}
