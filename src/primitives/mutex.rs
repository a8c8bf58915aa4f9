//! Mutex engine (§4.10): exclusive hold recorded directly in the parent's
//! status subresource — no child entity, unlike Semaphore/Lease.
//!
//! Lock/unlock use their own status-field handle (`MutexGuard`) instead of
//! `handle::ChildHandle`, since there's no child to delete: release is a
//! read-modify-write clearing `holder`/`phase` on the Mutex itself.

use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::retry::retry;
use crate::store::types::{Mutex, MutexPhase, MutexSpec};
use crate::store::Store;
use crate::wait::{remaining_budget, wait_for_condition};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn is_unlocked(m: &Mutex) -> bool {
    m.status
        .as_ref()
        .map(|s| s.phase == MutexPhase::Unlocked || s.holder.is_none())
        .unwrap_or(true)
}

async fn do_unlock(store: &Store<Mutex>, cfg: &BackoffConfig, name: &str, holder: &str, timeout: Duration) -> Result<()> {
    let cancel = CancellationToken::new();
    retry(
        "Mutex",
        name,
        || async {
            let mut m = store.get(name).await?;
            let current = m.status.as_ref().and_then(|s| s.holder.clone());
            if current.as_deref() != Some(holder) {
                return Err(Error::NotHolder("Mutex", holder.to_string(), name.to_string()));
            }
            let status = m.status.get_or_insert_with(Default::default);
            status.phase = MutexPhase::Unlocked;
            status.holder = None;
            status.locked_at = None;
            status.expires_at = None;
            store.status_update(&m).await
        },
        cfg,
        timeout,
        &cancel,
    )
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct MutexEngine {
    mutexes: Store<Mutex>,
    backoff: BackoffConfig,
}

impl MutexEngine {
    pub(crate) fn new(mutexes: Store<Mutex>, backoff: BackoffConfig) -> Self {
        Self { mutexes, backoff }
    }

    pub async fn create(&self, name: &str, ttl: Option<Duration>) -> Result<Mutex> {
        let obj = Mutex::new(
            name,
            MutexSpec {
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        self.mutexes.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<Mutex> {
        self.mutexes.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.mutexes.delete(name).await
    }

    /// Waits for the mutex to be unlockable, then attempts a status CAS,
    /// retrying on write conflicts, then re-polls once to confirm the
    /// write is observable before handing out a guard (§4.10).
    pub async fn lock(&self, name: &str, opts: Options) -> Result<MutexGuard> {
        let holder = opts.resolve_holder();
        let start = std::time::Instant::now();

        wait_for_condition(
            "Mutex",
            name,
            || async { self.mutexes.get_opt(name).await },
            is_unlocked,
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await?;

        // `opts.timeout` is a single budget for the whole call, not one
        // per phase: the CAS retry below gets whatever's left over after
        // the unlock-wait, not a fresh copy of the same duration.
        let retry_timeout = remaining_budget(opts.timeout, start, "Mutex", name)?;

        let ttl = opts.ttl;
        let claim_holder = holder.clone();
        retry(
            "Mutex",
            name,
            || async {
                let mut m = self.mutexes.get(name).await?;
                if !is_unlocked(&m) {
                    return Err(Error::Conflict("Mutex", name.to_string()));
                }
                let status = m.status.get_or_insert_with(Default::default);
                status.phase = MutexPhase::Locked;
                status.holder = Some(claim_holder.clone());
                status.locked_at = Some(Utc::now());
                status.expires_at = ttl
                    .and_then(|d| chrono::Duration::from_std(d).ok())
                    .map(|d| Utc::now() + d);
                self.mutexes.status_update(&m).await
            },
            &self.backoff,
            retry_timeout,
            &opts.cancel,
        )
        .await?;

        let confirmed = self.mutexes.get(name).await?;
        let observed = confirmed
            .status
            .as_ref()
            .map(|s| s.phase == MutexPhase::Locked && s.holder.as_deref() == Some(holder.as_str()))
            .unwrap_or(false);
        if !observed {
            return Err(Error::Invariant(
                "Mutex",
                name.to_string(),
                "lock write not observed on re-read".to_string(),
            ));
        }

        Ok(MutexGuard::new(self.mutexes.clone(), self.backoff.clone(), name.to_string(), holder))
    }

    pub async fn is_locked(&self, name: &str) -> Result<bool> {
        let m = self.mutexes.get(name).await?;
        Ok(!is_unlocked(&m))
    }
}

/// RAII guard over a locked Mutex. Unlike `ChildHandle`, release is a
/// status read-modify-write on the parent, not a delete-by-name.
pub struct MutexGuard {
    store: Store<Mutex>,
    backoff: BackoffConfig,
    name: String,
    holder: String,
    released: AtomicBool,
}

impl MutexGuard {
    fn new(store: Store<Mutex>, backoff: BackoffConfig, name: String, holder: String) -> Self {
        Self {
            store,
            backoff,
            name,
            holder,
            released: AtomicBool::new(false),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn unlock(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        do_unlock(&self.store, &self.backoff, &self.name, &self.holder, self.backoff.max_delay * 8).await
    }
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = self.store.clone();
        let backoff = self.backoff.clone();
        let name = self.name.clone();
        let holder = self.holder.clone();
        tokio::spawn(async move {
            let timeout = backoff.max_delay * 8;
            if let Err(e) = do_unlock(&store, &backoff, &name, &holder, timeout).await {
                log::error!("mutex {name}.drop unlock failed: {e}");
            } else {
                log::debug!("mutex {name}.drop unlock => OK");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn engine() -> MutexEngine {
        let cfg = BackoffConfig {
            operator_delay: Duration::from_millis(0),
            initial_delay: Duration::from_millis(1),
            factor: 1.2,
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        };
        MutexEngine::new(Store::fake("Mutex"), cfg)
    }

    #[tokio::test]
    async fn holder_enforcement() {
        let eng = engine();
        eng.create("mu", None).await.unwrap();

        let guard_a = eng
            .lock("mu", Options::new().with_holder("a").with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(eng.is_locked("mu").await.unwrap());

        let b_unlock = do_unlock(&eng.mutexes, &eng.backoff, "mu", "b", Duration::from_millis(50)).await;
        assert!(matches!(b_unlock, Err(Error::NotHolder(..))));

        guard_a.unlock().await.unwrap();
        assert!(!eng.is_locked("mu").await.unwrap());

        let _guard_b = eng
            .lock("mu", Options::new().with_holder("b").with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(eng.is_locked("mu").await.unwrap());
    }

    #[tokio::test]
    async fn double_unlock_is_idempotent() {
        let eng = engine();
        eng.create("mu2", None).await.unwrap();
        let guard = eng.lock("mu2", Options::new().with_holder("a")).await.unwrap();
        guard.unlock().await.unwrap();
        guard.unlock().await.unwrap();
    }
}
