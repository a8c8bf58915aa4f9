//! Client façade (§4.13): one `kube::Client` shared across a `Store<T>` per
//! entity kind, plus a thin per-primitive engine accessor.
//!
//! One `kube::Api<T>` per entity kind, exposed through thin engine
//! accessors instead of a single flat struct, so the façade can cover all
//! eight primitives while each engine stays a cheap `Clone` over the
//! façade's stores.

use crate::backoff::BackoffConfig;
use crate::primitives::barrier::BarrierEngine;
use crate::primitives::gate::GateEngine;
use crate::primitives::lease::LeaseEngine;
use crate::primitives::mutex::MutexEngine;
use crate::primitives::once::OnceEngine;
use crate::primitives::rwmutex::RwMutexEngine;
use crate::primitives::semaphore::SemaphoreEngine;
use crate::primitives::waitgroup::WaitGroupEngine;
use crate::store::types;
use crate::store::Store;
use kube::Client;

/// Entry point into the SDK. Construct from an already-resolved
/// `kube::Client` and scope (namespace) string — this SDK does not itself
/// resolve the ambient namespace (§4.13 "namespace auto-detection ...
/// out of scope") — callers typically build the client with
/// `kube::Client::try_default()` at the call site.
#[derive(Clone)]
pub struct Konductor {
    client: Client,
    scope: String,
    backoff: BackoffConfig,
}

impl Konductor {
    pub fn new(client: Client, scope: impl Into<String>) -> Self {
        Self {
            client,
            scope: scope.into(),
            backoff: BackoffConfig::default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns a derived façade bound to a different scope, sharing this
    /// façade's client handle. The façade itself never mutates in place.
    #[must_use]
    pub fn with_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            scope: scope.into(),
            backoff: self.backoff.clone(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn store<T: crate::store::Entity>(&self, kind: &'static str) -> Store<T> {
        Store::kube(self.client.clone(), &self.scope, kind)
    }

    pub fn semaphores(&self) -> SemaphoreEngine {
        SemaphoreEngine::new(
            self.store::<types::Semaphore>("Semaphore"),
            self.store::<types::Permit>("Permit"),
            self.backoff.clone(),
        )
    }

    pub fn barriers(&self) -> BarrierEngine {
        BarrierEngine::new(
            self.store::<types::Barrier>("Barrier"),
            self.store::<types::Arrival>("Arrival"),
            self.backoff.clone(),
        )
    }

    pub fn leases(&self) -> LeaseEngine {
        LeaseEngine::new(
            self.store::<types::Lease>("Lease"),
            self.store::<types::LeaseRequest>("LeaseRequest"),
            self.backoff.clone(),
        )
    }

    pub fn gates(&self) -> GateEngine {
        GateEngine::new(self.store::<types::Gate>("Gate"), self.backoff.clone())
    }

    pub fn mutexes(&self) -> MutexEngine {
        MutexEngine::new(self.store::<types::Mutex>("Mutex"), self.backoff.clone())
    }

    pub fn rwmutexes(&self) -> RwMutexEngine {
        RwMutexEngine::new(self.store::<types::RwMutex>("RwMutex"), self.backoff.clone())
    }

    pub fn waitgroups(&self) -> WaitGroupEngine {
        WaitGroupEngine::new(self.store::<types::WaitGroup>("WaitGroup"), self.backoff.clone())
    }

    pub fn onces(&self) -> OnceEngine {
        OnceEngine::new(self.store::<types::Once>("Once"))
    }
}
