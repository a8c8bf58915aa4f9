//! Semaphore engine (§4.6): counting permits over a child-entity model.

use super::{unique_child_name, API_VERSION};
use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::handle::Permit;
use crate::options::Options;
use crate::store::types::{Permit as PermitCrd, PermitPhase, PermitSpec, Semaphore, SemaphoreSpec};
use crate::store::types::parent_label;
use crate::store::{owner_reference, Store};
use crate::wait::wait_for_condition;
use kube::ResourceExt;
use std::time::Duration;

#[derive(Clone)]
pub struct SemaphoreEngine {
    semaphores: Store<Semaphore>,
    permits: Store<PermitCrd>,
    backoff: BackoffConfig,
}

impl SemaphoreEngine {
    pub(crate) fn new(
        semaphores: Store<Semaphore>,
        permits: Store<PermitCrd>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            semaphores,
            permits,
            backoff,
        }
    }

    pub async fn create(&self, name: &str, permits: i32, ttl: Option<Duration>) -> Result<Semaphore> {
        let obj = Semaphore::new(
            name,
            SemaphoreSpec {
                permits,
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        self.semaphores.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<Semaphore> {
        self.semaphores.get(name).await
    }

    pub async fn list(&self) -> Result<Vec<Semaphore>> {
        self.semaphores.list(None).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.semaphores.delete(name).await
    }

    /// Snapshot check, never polls (§7 "predicate-style helpers").
    pub async fn is_available(&self, name: &str) -> Result<bool> {
        let sem = self.semaphores.get(name).await?;
        Ok(sem.status.map(|s| s.available > 0).unwrap_or(false))
    }

    /// Acquires a permit, returning an RAII `Permit` handle on success.
    ///
    /// Per §4.6: the fast path (no timeout configured, or `available > 0`
    /// observed right now) creates the permit child immediately and lets
    /// the controller grant or queue it; a configured timeout instead
    /// waits for `available > 0` before creating the permit, then waits
    /// for the permit to be `Granted`.
    pub async fn acquire(&self, name: &str, opts: Options) -> Result<Permit> {
        let holder = opts.resolve_holder();
        let sem = self.semaphores.get(name).await?;
        let available_now = sem
            .status
            .as_ref()
            .map(|s| s.available > 0)
            .unwrap_or(false);

        if !opts.timeout.is_zero() && !available_now {
            wait_for_condition(
                "Semaphore",
                name,
                || async { self.semaphores.get_opt(name).await },
                |s: &Semaphore| s.status.as_ref().map(|st| st.available > 0).unwrap_or(false),
                &self.backoff,
                opts.timeout,
                &opts.cancel,
            )
            .await?;
        }

        let uid = sem.uid().unwrap_or_default();
        let permit = self
            .create_permit(name, &holder, &uid, opts.ttl)
            .await?;
        let permit_name = permit.name_any();

        let grant_result = wait_for_condition(
            "Permit",
            &permit_name,
            || async { self.permits.get_opt(&permit_name).await },
            |p: &PermitCrd| p.status.as_ref().map(|s| s.phase == PermitPhase::Granted).unwrap_or(false),
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await;

        match grant_result {
            Ok(_) => Ok(Permit::new(self.permits.clone(), permit_name, holder)),
            Err(e) => {
                // Best-effort cleanup: the permit never got granted, so we
                // don't hand the caller a handle for it (§4.14).
                let _ = self.permits.delete(&permit_name).await;
                Err(e)
            }
        }
    }

    /// Creates the permit child, regenerating its name on an `AlreadyExists`
    /// collision rather than adopting a pre-existing permit we didn't
    /// create (§4.6) — conservative, since adopting one we didn't create
    /// could hand a caller someone else's permit.
    async fn create_permit(
        &self,
        semaphore_name: &str,
        holder: &str,
        semaphore_uid: &str,
        ttl: Option<Duration>,
    ) -> Result<PermitCrd> {
        const MAX_ATTEMPTS: usize = 5;
        let mut last_err = None;
        for _ in 0..MAX_ATTEMPTS {
            let child_name = unique_child_name(semaphore_name, holder);
            let mut obj = PermitCrd::new(
                &child_name,
                PermitSpec {
                    semaphore: semaphore_name.to_string(),
                    holder: holder.to_string(),
                    ttl_seconds: ttl.map(|d| d.as_secs() as i64),
                },
            );
            obj.metadata.owner_references = Some(vec![owner_reference(
                API_VERSION,
                "Semaphore",
                semaphore_name,
                semaphore_uid,
            )]);
            obj.metadata.labels = Some(parent_label("semaphore", semaphore_name));

            match self.permits.create(&obj).await {
                Ok(created) => return Ok(created),
                Err(e) if e.is_already_exists() => {
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Fatal("permit id generation exhausted".into())))
    }

    /// Acquires without waiting for the store to settle: a plain snapshot
    /// read of `available`, bypassing `wait_for_condition` (and its
    /// unconditional operator-settle delay) entirely so a full semaphore
    /// returns `Ok(None)` immediately rather than after `operator_delay`.
    pub async fn try_acquire(&self, name: &str, opts: Options) -> Result<Option<Permit>> {
        let holder = opts.resolve_holder();
        let sem = self.semaphores.get(name).await?;
        let available_now = sem.status.as_ref().map(|s| s.available > 0).unwrap_or(false);
        if !available_now {
            return Ok(None);
        }

        let uid = sem.uid().unwrap_or_default();
        let permit = self.create_permit(name, &holder, &uid, opts.ttl).await?;
        let permit_name = permit.name_any();

        let granted = self
            .permits
            .get_opt(&permit_name)
            .await?
            .and_then(|p| p.status)
            .map(|s| s.phase == PermitPhase::Granted)
            .unwrap_or(false);

        if granted {
            Ok(Some(Permit::new(self.permits.clone(), permit_name, holder)))
        } else {
            let _ = self.permits.delete(&permit_name).await;
            Ok(None)
        }
    }
}
