//! WaitGroup engine (§4.11): counting rendezvous, a mirror image of Barrier
//! (counts down to zero instead of up to a threshold).

use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::retry::retry;
use crate::store::types::{WaitGroup, WaitGroupPhase, WaitGroupSpec};
use crate::store::Store;
use crate::wait::wait_for_condition;
use std::time::Duration;

#[derive(Clone)]
pub struct WaitGroupEngine {
    groups: Store<WaitGroup>,
    backoff: BackoffConfig,
}

impl WaitGroupEngine {
    pub(crate) fn new(groups: Store<WaitGroup>, backoff: BackoffConfig) -> Self {
        Self { groups, backoff }
    }

    pub async fn create(&self, name: &str, ttl: Option<Duration>) -> Result<WaitGroup> {
        let obj = WaitGroup::new(
            name,
            WaitGroupSpec {
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        self.groups.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<WaitGroup> {
        self.groups.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.groups.delete(name).await
    }

    /// Adjusts the counter by `delta`, retrying through write conflicts. A
    /// counter that would go negative is a fatal invariant violation (§4.11)
    /// — the engine surfaces `Error::Invariant` rather than clamping at 0.
    pub async fn add(&self, name: &str, delta: i32, timeout: Duration, cancel: &tokio_util::sync::CancellationToken) -> Result<WaitGroup> {
        retry(
            "WaitGroup",
            name,
            || async {
                let mut g = self.groups.get(name).await?;
                let status = g.status.get_or_insert_with(Default::default);
                let next = status.counter + delta;
                if next < 0 {
                    return Err(Error::Invariant(
                        "WaitGroup",
                        name.to_string(),
                        format!("counter would go negative ({} + {})", status.counter, delta),
                    ));
                }
                status.counter = next;
                status.phase = if next == 0 {
                    WaitGroupPhase::Done
                } else {
                    WaitGroupPhase::Waiting
                };
                self.groups.status_update(&g).await
            },
            &self.backoff,
            timeout,
            cancel,
        )
        .await
    }

    pub async fn done(&self, name: &str, timeout: Duration, cancel: &tokio_util::sync::CancellationToken) -> Result<WaitGroup> {
        self.add(name, -1, timeout, cancel).await
    }

    pub async fn wait(&self, name: &str, opts: &Options) -> Result<WaitGroup> {
        wait_for_condition(
            "WaitGroup",
            name,
            || async { self.groups.get_opt(name).await },
            |g: &WaitGroup| g.status.as_ref().map(|s| s.phase == WaitGroupPhase::Done).unwrap_or(false),
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use tokio_util::sync::CancellationToken;

    fn engine() -> WaitGroupEngine {
        let cfg = BackoffConfig {
            operator_delay: Duration::from_millis(0),
            initial_delay: Duration::from_millis(1),
            factor: 1.2,
            max_delay: Duration::from_millis(10),
            jitter: 0.0,
        };
        WaitGroupEngine::new(Store::fake("WaitGroup"), cfg)
    }

    #[tokio::test]
    async fn wait_returns_only_after_counter_reaches_zero() {
        let eng = engine();
        eng.create("wg", None).await.unwrap();
        let cancel = CancellationToken::new();

        eng.add("wg", 3, Duration::from_secs(1), &cancel).await.unwrap();
        assert_eq!(eng.get("wg").await.unwrap().status.unwrap().counter, 3);

        for _ in 0..3 {
            eng.done("wg", Duration::from_secs(1), &cancel).await.unwrap();
        }

        let done = eng
            .wait("wg", &Options::new().with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(done.status.unwrap().counter, 0);
    }

    #[tokio::test]
    async fn negative_counter_is_invariant_violation() {
        let eng = engine();
        eng.create("wg2", None).await.unwrap();
        let cancel = CancellationToken::new();
        let result = eng.done("wg2", Duration::from_secs(1), &cancel).await;
        assert!(matches!(result, Err(Error::Invariant(..))));
    }
}
