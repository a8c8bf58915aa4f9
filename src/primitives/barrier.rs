//! Barrier engine (§4.7): N-of-M (or quorum-of-M) rendezvous.

use super::{holder_child_name, API_VERSION};
use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::store::types::{Arrival, ArrivalSpec, Barrier, BarrierPhase, BarrierSpec, parent_label};
use crate::store::{owner_reference, Store};
use crate::wait::wait_for_condition;
use kube::ResourceExt;
use std::time::Duration;

#[derive(Clone)]
pub struct BarrierEngine {
    barriers: Store<Barrier>,
    arrivals: Store<Arrival>,
    backoff: BackoffConfig,
}

impl BarrierEngine {
    pub(crate) fn new(barriers: Store<Barrier>, arrivals: Store<Arrival>, backoff: BackoffConfig) -> Self {
        Self {
            barriers,
            arrivals,
            backoff,
        }
    }

    pub async fn create(
        &self,
        name: &str,
        expected: i32,
        quorum: Option<i32>,
        timeout: Option<Duration>,
    ) -> Result<Barrier> {
        let spec = BarrierSpec {
            expected,
            quorum,
            timeout_seconds: timeout.map(|d| d.as_secs() as i64),
        };
        spec.validate()
            .map_err(|msg| Error::Invariant("Barrier", name.to_string(), msg))?;
        self.barriers.create(&Barrier::new(name, spec)).await
    }

    pub async fn get(&self, name: &str) -> Result<Barrier> {
        self.barriers.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.barriers.delete(name).await
    }

    /// Records this holder's arrival. Idempotent for a fixed
    /// `(barrier, holder)` pair: a duplicate arrival collides on the
    /// deterministic child name and is treated as success (§4.7).
    pub async fn arrive(&self, name: &str, opts: &Options) -> Result<()> {
        let holder = opts.resolve_holder();
        let barrier = self.barriers.get(name).await?;
        let uid = barrier.uid().unwrap_or_default();

        let mut obj = Arrival::new(
            &holder_child_name(name, &holder),
            ArrivalSpec {
                barrier: name.to_string(),
                holder: holder.clone(),
            },
        );
        obj.metadata.owner_references = Some(vec![owner_reference(API_VERSION, "Barrier", name, &uid)]);
        obj.metadata.labels = Some(parent_label("barrier", name));

        match self.arrivals.create(&obj).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Waits for the barrier to open. `Failed` is terminal for this call;
    /// the barrier entity is left in place for operator inspection, and a
    /// later call may re-poll and still observe `Failed`.
    pub async fn wait(&self, name: &str, opts: &Options) -> Result<Barrier> {
        let result = wait_for_condition(
            "Barrier",
            name,
            || async { self.barriers.get_opt(name).await },
            |b: &Barrier| {
                b.status
                    .as_ref()
                    .map(|s| matches!(s.phase, BarrierPhase::Open | BarrierPhase::Failed))
                    .unwrap_or(false)
            },
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await?;

        match result.status.as_ref().map(|s| s.phase) {
            Some(BarrierPhase::Open) => Ok(result),
            Some(BarrierPhase::Failed) => Err(Error::Denied(
                "Barrier",
                name.to_string(),
                "barrier failed".to_string(),
            )),
            _ => unreachable!("predicate only returns on Open or Failed"),
        }
    }

    pub async fn check(&self, name: &str) -> Result<BarrierPhase> {
        let barrier = self.barriers.get(name).await?;
        Ok(barrier.status.map(|s| s.phase).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::store::types::BarrierStatus;

    fn engine() -> BarrierEngine {
        let cfg = BackoffConfig {
            operator_delay: Duration::from_millis(0),
            initial_delay: Duration::from_millis(2),
            factor: 1.2,
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        };
        BarrierEngine::new(Store::fake("Barrier"), Store::fake("Arrival"), cfg)
    }

    #[tokio::test]
    async fn quorum_above_expected_is_rejected_at_create() {
        let eng = engine();
        let result = eng.create("bar", 5, Some(10), None).await;
        assert!(matches!(result, Err(Error::Invariant(..))));
    }

    #[tokio::test]
    async fn arrive_is_idempotent_for_same_holder() {
        let eng = engine();
        eng.create("bar2", 5, Some(3), None).await.unwrap();
        let opts = Options::new().with_holder("h1");
        eng.arrive("bar2", &opts).await.unwrap();
        eng.arrive("bar2", &opts).await.unwrap();
        assert_eq!(eng.arrivals.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wait_opens_once_quorum_reached() {
        let eng = engine();
        let barrier = eng.create("bar3", 5, Some(3), None).await.unwrap();

        let barriers = eng.barriers.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut b = barriers.get("bar3").await.unwrap();
            b.status = Some(BarrierStatus {
                arrived: 3,
                phase: BarrierPhase::Open,
                opened_at: None,
                arrivals: vec!["h1".into(), "h2".into(), "h3".into()],
            });
            barriers.update(&b).await.unwrap();
        });
        let _ = barrier;

        let opened = eng
            .wait("bar3", &Options::new().with_timeout(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(opened.status.unwrap().phase, BarrierPhase::Open);
    }
}
