//! Once engine (§4.12): best-effort exactly-once execution gated by a
//! single status CAS. The first caller whose status-update lands wins the
//! execution right; a caller that crashes between winning and running its
//! closure leaves the entity marked executed without having run it.

use crate::error::{Error, Result};
use crate::options::Options;
use crate::store::types::{Once, OncePhase, OnceSpec};
use crate::store::Store;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;

#[derive(Clone)]
pub struct OnceEngine {
    onces: Store<Once>,
}

impl OnceEngine {
    pub(crate) fn new(onces: Store<Once>) -> Self {
        Self { onces }
    }

    pub async fn create(&self, name: &str, ttl: Option<Duration>) -> Result<Once> {
        let obj = Once::new(
            name,
            OnceSpec {
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        self.onces.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<Once> {
        self.onces.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.onces.delete(name).await
    }

    /// Runs `f` at most once across all callers racing on this entity.
    ///
    /// Returns `(won, outcome)`: `won=false` means either the entity was
    /// already executed or another caller's claim landed first, and
    /// `outcome` is always `Ok(())` in that case (`f` never ran). `won=true`
    /// means this call's status-update claimed the execution right;
    /// `outcome` carries `f`'s result, with status rolled back to `Pending`
    /// on failure so a later caller can retry.
    pub async fn do_once<F, Fut>(&self, name: &str, opts: &Options, f: F) -> Result<(bool, Result<()>)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let holder = opts.resolve_holder();
        let mut once = self.onces.get(name).await?;

        if once.status.as_ref().map(|s| s.executed).unwrap_or(false) {
            return Ok((false, Ok(())));
        }

        {
            let status = once.status.get_or_insert_with(Default::default);
            status.executed = true;
            status.executor = Some(holder.clone());
            status.executed_at = Some(Utc::now());
            status.phase = OncePhase::Executed;
        }

        match self.onces.status_update(&once).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => return Ok((false, Ok(()))),
            Err(e) => return Err(e),
        }

        match f().await {
            Ok(()) => Ok((true, Ok(()))),
            Err(fn_err) => match self.rollback(name).await {
                Ok(()) => Ok((true, Err(fn_err))),
                Err(rollback_err) => Err(Error::Fatal(format!(
                    "once {name}: execution failed ({fn_err}) and rollback failed ({rollback_err}); \
                     entity left marked executed, manual reconciliation required"
                ))),
            },
        }
    }

    pub async fn has_executed(&self, name: &str) -> Result<bool> {
        let once = self.onces.get(name).await?;
        Ok(once.status.map(|s| s.executed).unwrap_or(false))
    }

    async fn rollback(&self, name: &str) -> Result<()> {
        let mut once = self.onces.get(name).await?;
        let status = once.status.get_or_insert_with(Default::default);
        status.executed = false;
        status.executor = None;
        status.executed_at = None;
        status.phase = OncePhase::Pending;
        self.onces.status_update(&once).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{FuturesUnordered, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use taken::take;

    #[tokio::test]
    async fn exactly_once_across_concurrent_callers() {
        let eng = OnceEngine::new(Store::fake("Once"));
        eng.create("once", None).await.unwrap();
        let run_count = Arc::new(AtomicUsize::new(0));

        let wins: Vec<bool> = (0..10)
            .map(|i| {
                take!(&eng, &run_count);
                async move {
                    let opts = Options::new().with_holder(format!("caller-{i}"));
                    let (won, outcome) = eng
                        .do_once("once", &opts, || async {
                            run_count.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await
                        .unwrap();
                    outcome.unwrap();
                    won
                }
            })
            .collect::<FuturesUnordered<_>>()
            .collect()
            .await;

        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert!(eng.has_executed("once").await.unwrap());
    }

    #[tokio::test]
    async fn failed_fn_rolls_back_and_lets_next_caller_win() {
        let eng = OnceEngine::new(Store::fake("Once"));
        eng.create("once2", None).await.unwrap();
        let opts = Options::new().with_holder("a");

        let (won, outcome) = eng
            .do_once("once2", &opts, || async { Err(Error::Fatal("boom".into())) })
            .await
            .unwrap();
        assert!(won);
        assert!(outcome.is_err());
        assert!(!eng.has_executed("once2").await.unwrap());

        let opts_b = Options::new().with_holder("b");
        let (won_b, outcome_b) = eng.do_once("once2", &opts_b, || async { Ok(()) }).await.unwrap();
        assert!(won_b);
        assert!(outcome_b.is_ok());
        assert!(eng.has_executed("once2").await.unwrap());
    }
}
