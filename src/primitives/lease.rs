//! Lease engine (§4.8): exclusive, renewable hold over a named resource,
//! admitted priority-descending-then-FIFO by the controller.
//!
//! There is no client-side renewal task here: the controller renews the
//! lease while the request exists and the holder is alive, signaled purely
//! by the request's continued existence. No background
//! `AbortHandle`/`Abortable` keepalive loop.

use super::{holder_child_name, API_VERSION};
use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::handle::LeaseHandle;
use crate::options::Options;
use crate::store::types::{parent_label, Lease, LeaseRequest, LeaseRequestPhase, LeaseRequestSpec, LeaseSpec};
use crate::store::{owner_reference, Store};
use crate::wait::wait_for_condition;
use kube::ResourceExt;
use std::time::Duration;

#[derive(Clone)]
pub struct LeaseEngine {
    leases: Store<Lease>,
    requests: Store<LeaseRequest>,
    backoff: BackoffConfig,
}

impl LeaseEngine {
    pub(crate) fn new(leases: Store<Lease>, requests: Store<LeaseRequest>, backoff: BackoffConfig) -> Self {
        Self {
            leases,
            requests,
            backoff,
        }
    }

    pub async fn create(&self, name: &str, ttl: Option<Duration>) -> Result<Lease> {
        let obj = Lease::new(
            name,
            LeaseSpec {
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        self.leases.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<Lease> {
        self.leases.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.leases.delete(name).await
    }

    /// Requests the lease, blocking until the controller grants or denies
    /// the request (or the deadline/cancellation fires). On `Denied` or
    /// timeout the request is deleted best-effort so a stale request
    /// doesn't linger in the queue.
    pub async fn acquire(&self, name: &str, opts: Options) -> Result<LeaseHandle> {
        let holder = opts.resolve_holder();
        let lease = self.leases.get(name).await?;
        let uid = lease.uid().unwrap_or_default();
        let request_name = holder_child_name(name, &holder);

        let mut obj = LeaseRequest::new(
            &request_name,
            LeaseRequestSpec {
                lease: name.to_string(),
                holder: holder.clone(),
                priority: opts.priority,
            },
        );
        obj.metadata.owner_references = Some(vec![owner_reference(API_VERSION, "Lease", name, &uid)]);
        obj.metadata.labels = Some(parent_label("lease", name));

        match self.requests.create(&obj).await {
            Ok(_) | Err(Error::AlreadyExists(..)) => {}
            Err(e) => return Err(e),
        }

        let result = wait_for_condition(
            "LeaseRequest",
            &request_name,
            || async { self.requests.get_opt(&request_name).await },
            |r: &LeaseRequest| {
                r.status
                    .as_ref()
                    .map(|s| matches!(s.phase, LeaseRequestPhase::Granted | LeaseRequestPhase::Denied))
                    .unwrap_or(false)
            },
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await;

        match result {
            Ok(req) if req.status.as_ref().map(|s| s.phase) == Some(LeaseRequestPhase::Granted) => {
                Ok(LeaseHandle::new(self.requests.clone(), request_name, holder))
            }
            Ok(_) => {
                let _ = self.requests.delete(&request_name).await;
                Err(Error::Denied(
                    "Lease",
                    name.to_string(),
                    "request denied by controller".to_string(),
                ))
            }
            Err(e) => {
                let _ = self.requests.delete(&request_name).await;
                Err(e)
            }
        }
    }

    /// Requests the lease and takes a single snapshot read of the request,
    /// bypassing `wait_for_condition` (and its unconditional operator-settle
    /// delay) so an ungranted request returns `Ok(None)` immediately rather
    /// than after `operator_delay`.
    pub async fn try_acquire(&self, name: &str, opts: Options) -> Result<Option<LeaseHandle>> {
        let holder = opts.resolve_holder();
        let lease = self.leases.get(name).await?;
        let uid = lease.uid().unwrap_or_default();
        let request_name = holder_child_name(name, &holder);

        let mut obj = LeaseRequest::new(
            &request_name,
            LeaseRequestSpec {
                lease: name.to_string(),
                holder: holder.clone(),
                priority: opts.priority,
            },
        );
        obj.metadata.owner_references = Some(vec![owner_reference(API_VERSION, "Lease", name, &uid)]);
        obj.metadata.labels = Some(parent_label("lease", name));

        match self.requests.create(&obj).await {
            Ok(_) | Err(Error::AlreadyExists(..)) => {}
            Err(e) => return Err(e),
        }

        let granted = self
            .requests
            .get_opt(&request_name)
            .await?
            .and_then(|r| r.status)
            .map(|s| s.phase == LeaseRequestPhase::Granted)
            .unwrap_or(false);

        if granted {
            Ok(Some(LeaseHandle::new(self.requests.clone(), request_name, holder)))
        } else {
            let _ = self.requests.delete(&request_name).await;
            Ok(None)
        }
    }

    pub async fn holder(&self, name: &str) -> Result<Option<String>> {
        let lease = self.leases.get(name).await?;
        Ok(lease.status.and_then(|s| s.holder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn engine() -> LeaseEngine {
        let cfg = BackoffConfig {
            operator_delay: Duration::from_millis(0),
            initial_delay: Duration::from_millis(2),
            factor: 1.2,
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        };
        LeaseEngine::new(Store::fake("Lease"), Store::fake("LeaseRequest"), cfg)
    }

    async fn grant_request(requests: &Store<LeaseRequest>, name: &str) {
        let mut r = requests.get(name).await.unwrap();
        r.status = Some(crate::store::types::LeaseRequestStatus {
            phase: LeaseRequestPhase::Granted,
        });
        requests.update(&r).await.unwrap();
    }

    #[tokio::test]
    async fn acquire_succeeds_once_controller_grants() {
        let eng = engine();
        eng.create("lease", None).await.unwrap();

        let requests = eng.requests.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            grant_request(&requests, "lease-a").await;
        });

        let handle = eng
            .acquire("lease", Options::new().with_holder("a").with_timeout(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(handle.holder(), "a");
    }

    #[tokio::test]
    async fn try_acquire_returns_none_immediately_when_nobody_grants() {
        let eng = engine();
        eng.create("lease2", None).await.unwrap();
        let result = eng.try_acquire("lease2", Options::new().with_holder("a")).await.unwrap();
        assert!(result.is_none());
        assert!(eng.requests.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_request_is_cleaned_up() {
        let eng = engine();
        eng.create("lease3", None).await.unwrap();

        let requests = eng.requests.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut r = requests.get("lease3-a").await.unwrap();
            r.status = Some(crate::store::types::LeaseRequestStatus {
                phase: LeaseRequestPhase::Denied,
            });
            requests.update(&r).await.unwrap();
        });

        let result = eng
            .acquire("lease3", Options::new().with_holder("a").with_timeout(Duration::from_secs(2)))
            .await;
        assert!(matches!(result, Err(Error::Denied(..))));
        assert!(eng.requests.list(None).await.unwrap().is_empty());
    }
}
