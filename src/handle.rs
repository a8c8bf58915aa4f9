//! Handle lifecycle (§4.5): RAII ownership of an acquired resource with
//! idempotent release.
//!
//! `ChildHandle<T>` covers the child-entity release model shared by
//! `Permit` and `LeaseRequest` — release is just "delete the child by
//! name, `NotFound` is success". The status-field release model (Mutex,
//! RWMutex — read-modify-write the parent with a holder check) has no
//! shared shape across the two primitives (the holder check differs:
//! RWMutex must also distinguish reader vs. writer), so each of those
//! lives next to its engine in `primitives::mutex`/`primitives::rwmutex`.
//!
//! `Drop` is a safety net: it spawns a best-effort, fire-and-forget
//! release and logs failure. Callers that want deterministic, awaitable
//! cleanup call `release()` explicitly.

use crate::error::Result;
use crate::store::Store;
use crate::store::types;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// A handle over a child entity (Permit, LeaseRequest) whose release is a
/// best-effort delete-by-name.
pub struct ChildHandle<T: crate::store::Entity> {
    store: Store<T>,
    name: String,
    holder: String,
    released: AtomicBool,
}

impl<T: crate::store::Entity> ChildHandle<T> {
    pub(crate) fn new(store: Store<T>, name: String, holder: String) -> Self {
        Self {
            store,
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

    /// Deletes the child entity. Idempotent: a second call, or a call
    /// after `Drop` already fired the background release, is a no-op.
    pub async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.store.delete(&self.name).await
    }
}

impl<T: crate::store::Entity> Drop for ChildHandle<T> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = self.store.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            if let Err(e) = store.delete(&name).await {
                log::error!("{name}.drop release failed: {e}");
            } else {
                log::debug!("{name}.drop release => OK");
            }
        });
    }
}

impl<T: crate::store::Entity> Debug for ChildHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("name", &self.name)
            .field("holder", &self.holder)
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}

/// RAII handle over a Permit (§4.6 acquire/release).
pub type Permit = ChildHandle<types::Permit>;

/// RAII handle over a LeaseRequest (§4.8 acquire/release). Holds no
/// background renewal task: renewal is the controller's job.
pub type LeaseHandle = ChildHandle<types::LeaseRequest>;
