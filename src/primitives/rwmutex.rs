//! RWMutex engine (§4.10): shared read / exclusive write over a status
//! subresource tracking a write holder and a reader set.
//!
//! Writers can be starved by a continuously-refreshed reader set; the
//! design accepts this (§4.10 "Starvation") — writer preference would be a
//! controller policy, not an SDK concern.

use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::retry::retry;
use crate::store::types::{RwMutex, RwMutexPhase, RwMutexSpec};
use crate::store::Store;
use crate::wait::{remaining_budget, wait_for_condition};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn writable(m: &RwMutex) -> bool {
    m.status
        .as_ref()
        .map(|s| s.write_holder.is_none())
        .unwrap_or(true)
}

fn write_lockable(m: &RwMutex) -> bool {
    m.status
        .as_ref()
        .map(|s| s.write_holder.is_none() && s.read_holders.is_empty())
        .unwrap_or(true)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Read,
    Write,
}

async fn do_unlock(store: &Store<RwMutex>, cfg: &BackoffConfig, name: &str, holder: &str, timeout: Duration) -> Result<()> {
    let cancel = CancellationToken::new();
    retry(
        "RwMutex",
        name,
        || async {
            let mut m = store.get(name).await?;
            let status = m.status.get_or_insert_with(Default::default);
            let is_writer = status.write_holder.as_deref() == Some(holder);
            let was_reader = status.read_holders.iter().any(|h| h == holder);

            if is_writer {
                status.write_holder = None;
                status.phase = RwMutexPhase::Unlocked;
                status.locked_at = None;
                status.expires_at = None;
            } else if was_reader {
                status.read_holders.retain(|h| h != holder);
                if status.read_holders.is_empty() && status.write_holder.is_none() {
                    status.phase = RwMutexPhase::Unlocked;
                    status.locked_at = None;
                    status.expires_at = None;
                }
            } else {
                return Err(Error::NotHolder("RwMutex", holder.to_string(), name.to_string()));
            }
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
pub struct RwMutexEngine {
    mutexes: Store<RwMutex>,
    backoff: BackoffConfig,
}

impl RwMutexEngine {
    pub(crate) fn new(mutexes: Store<RwMutex>, backoff: BackoffConfig) -> Self {
        Self { mutexes, backoff }
    }

    pub async fn create(&self, name: &str, ttl: Option<Duration>) -> Result<RwMutex> {
        let obj = RwMutex::new(
            name,
            RwMutexSpec {
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        self.mutexes.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<RwMutex> {
        self.mutexes.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.mutexes.delete(name).await
    }

    pub async fn rlock(&self, name: &str, opts: Options) -> Result<RwMutexGuard> {
        let holder = opts.resolve_holder();
        let start = std::time::Instant::now();

        wait_for_condition(
            "RwMutex",
            name,
            || async { self.mutexes.get_opt(name).await },
            writable,
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await?;

        let retry_timeout = remaining_budget(opts.timeout, start, "RwMutex", name)?;
        let ttl = opts.ttl;
        let claim_holder = holder.clone();
        retry(
            "RwMutex",
            name,
            || async {
                let mut m = self.mutexes.get(name).await?;
                if !writable(&m) {
                    return Err(Error::Conflict("RwMutex", name.to_string()));
                }
                let status = m.status.get_or_insert_with(Default::default);
                if !status.read_holders.iter().any(|h| h == &claim_holder) {
                    status.read_holders.push(claim_holder.clone());
                }
                status.phase = RwMutexPhase::ReadLocked;
                if status.locked_at.is_none() {
                    status.locked_at = Some(Utc::now());
                }
                if status.expires_at.is_none() {
                    status.expires_at = ttl
                        .and_then(|d| chrono::Duration::from_std(d).ok())
                        .map(|d| Utc::now() + d);
                }
                self.mutexes.status_update(&m).await
            },
            &self.backoff,
            retry_timeout,
            &opts.cancel,
        )
        .await?;

        Ok(RwMutexGuard::new(
            self.mutexes.clone(),
            self.backoff.clone(),
            name.to_string(),
            holder,
            Mode::Read,
        ))
    }

    pub async fn lock(&self, name: &str, opts: Options) -> Result<RwMutexGuard> {
        let holder = opts.resolve_holder();
        let start = std::time::Instant::now();

        wait_for_condition(
            "RwMutex",
            name,
            || async { self.mutexes.get_opt(name).await },
            write_lockable,
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await?;

        let retry_timeout = remaining_budget(opts.timeout, start, "RwMutex", name)?;
        let ttl = opts.ttl;
        let claim_holder = holder.clone();
        retry(
            "RwMutex",
            name,
            || async {
                let mut m = self.mutexes.get(name).await?;
                if !write_lockable(&m) {
                    return Err(Error::Conflict("RwMutex", name.to_string()));
                }
                let status = m.status.get_or_insert_with(Default::default);
                status.phase = RwMutexPhase::WriteLocked;
                status.write_holder = Some(claim_holder.clone());
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

        Ok(RwMutexGuard::new(
            self.mutexes.clone(),
            self.backoff.clone(),
            name.to_string(),
            holder,
            Mode::Write,
        ))
    }
}

/// RAII guard over an RWMutex hold, either shared or exclusive.
pub struct RwMutexGuard {
    store: Store<RwMutex>,
    backoff: BackoffConfig,
    name: String,
    holder: String,
    mode: Mode,
    released: AtomicBool,
}

impl RwMutexGuard {
    fn new(store: Store<RwMutex>, backoff: BackoffConfig, name: String, holder: String, mode: Mode) -> Self {
        Self {
            store,
            backoff,
            name,
            holder,
            mode,
            released: AtomicBool::new(false),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn is_write_lock(&self) -> bool {
        self.mode == Mode::Write
    }

    pub async fn unlock(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        do_unlock(&self.store, &self.backoff, &self.name, &self.holder, self.backoff.max_delay * 8).await
    }
}

impl Drop for RwMutexGuard {
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
                log::error!("rwmutex {name}.drop unlock failed: {e}");
            } else {
                log::debug!("rwmutex {name}.drop unlock => OK");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn engine() -> RwMutexEngine {
        let cfg = BackoffConfig {
            operator_delay: Duration::from_millis(0),
            initial_delay: Duration::from_millis(1),
            factor: 1.2,
            max_delay: Duration::from_millis(10),
            jitter: 0.0,
        };
        RwMutexEngine::new(Store::fake("RwMutex"), cfg)
    }

    #[tokio::test]
    async fn concurrent_readers_block_writer_until_released() {
        let eng = engine();
        eng.create("rw", None).await.unwrap();

        let r1 = eng
            .rlock("rw", Options::new().with_holder("r1").with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        let r2 = eng
            .rlock("rw", Options::new().with_holder("r2").with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();

        let write_attempt = eng
            .lock("rw", Options::new().with_holder("w").with_timeout(Duration::from_millis(100)))
            .await;
        assert!(matches!(write_attempt, Err(Error::Timeout(..))));

        r1.unlock().await.unwrap();
        r2.unlock().await.unwrap();

        let w = eng
            .lock("rw", Options::new().with_holder("w").with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(w.is_write_lock());
    }

    #[tokio::test]
    async fn non_holder_unlock_fails() {
        let eng = engine();
        eng.create("rw2", None).await.unwrap();
        let _r = eng.rlock("rw2", Options::new().with_holder("r1")).await.unwrap();
        let result = do_unlock(&eng.mutexes, &eng.backoff, "rw2", "stranger", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::NotHolder(..))));
    }
}
