//! Store abstraction (§4.1, §6): typed CRUD + status-update over the
//! declarative store, with transport errors folded into the taxonomy of
//! `crate::error::Error` rather than leaked to callers.

pub mod types;

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

#[cfg(test)]
pub mod fake;

/// Builds an `OwnerReference` pointing at a parent entity, for cascade
/// deletion of children (Permit, Arrival, LeaseRequest) per §3.
pub fn owner_reference(api_version: &str, kind: &str, name: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..Default::default()
    }
}

/// Trait bound shared by every CRD kind this SDK manipulates.
pub trait Entity:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}
impl<T> Entity for T where
    T: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

#[derive(Clone)]
enum Backend<T> {
    Kube(kube::Api<T>),
    #[cfg(test)]
    Fake(fake::FakeApi<T>),
}

/// Typed CRUD + status-update over one entity kind, scoped to one
/// namespace (§4.1). Wraps `kube::Api<T>`, generic across every entity
/// kind instead of being specific to one.
#[derive(Clone)]
pub struct Store<T> {
    backend: Backend<T>,
    kind: &'static str,
}

impl<T: Entity> Store<T> {
    pub fn kube(client: Client, scope: &str, kind: &'static str) -> Self {
        Self {
            backend: Backend::Kube(kube::Api::namespaced(client, scope)),
            kind,
        }
    }

    #[cfg(test)]
    pub fn fake(kind: &'static str) -> Self {
        Self {
            backend: Backend::Fake(fake::FakeApi::new()),
            kind,
        }
    }

    pub async fn get(&self, name: &str) -> Result<T> {
        match &self.backend {
            Backend::Kube(api) => api
                .get(name)
                .await
                .map_err(|e| Error::from_kube(self.kind, name, e)),
            #[cfg(test)]
            Backend::Fake(api) => api.get(self.kind, name),
        }
    }

    /// Like `get`, but folds `NotFound` into `Ok(None)` — the shape the
    /// wait engine's `fetch` closures want (§4.2).
    pub async fn get_opt(&self, name: &str) -> Result<Option<T>> {
        match self.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, label_selector: Option<&str>) -> Result<Vec<T>> {
        match &self.backend {
            Backend::Kube(api) => {
                let mut lp = ListParams::default();
                if let Some(sel) = label_selector {
                    lp = lp.labels(sel);
                }
                api.list(&lp)
                    .await
                    .map(|l| l.items)
                    .map_err(|e| Error::from_kube(self.kind, "<list>", e))
            }
            #[cfg(test)]
            Backend::Fake(api) => Ok(api.list(label_selector)),
        }
    }

    pub async fn create(&self, obj: &T) -> Result<T> {
        let name = obj.name_any();
        match &self.backend {
            Backend::Kube(api) => api
                .create(&PostParams::default(), obj)
                .await
                .map_err(|e| Error::from_kube(self.kind, &name, e)),
            #[cfg(test)]
            Backend::Fake(api) => api.create(self.kind, obj.clone()),
        }
    }

    /// Spec update (bumps the version token; status is untouched).
    pub async fn update(&self, obj: &T) -> Result<T> {
        let name = obj.name_any();
        match &self.backend {
            Backend::Kube(api) => api
                .replace(&name, &PostParams::default(), obj)
                .await
                .map_err(|e| Error::from_kube(self.kind, &name, e)),
            #[cfg(test)]
            Backend::Fake(api) => api.update(self.kind, obj.clone()),
        }
    }

    /// Status-subresource update: does not bump `spec`'s version, and vice
    /// versa (§6). Clients only call this for mutex/rwmutex/gate control
    /// operations per §3; everywhere else status belongs to the
    /// controller.
    pub async fn status_update(&self, obj: &T) -> Result<T> {
        let name = obj.name_any();
        match &self.backend {
            Backend::Kube(api) => {
                let body = serde_json::to_vec(obj)?;
                api.replace_status(&name, &PostParams::default(), body)
                    .await
                    .map_err(|e| Error::from_kube(self.kind, &name, e))
            }
            #[cfg(test)]
            Backend::Fake(api) => api.update(self.kind, obj.clone()),
        }
    }

    /// Idempotent: deleting a nonexistent entity succeeds (§4.14).
    pub async fn delete(&self, name: &str) -> Result<()> {
        match &self.backend {
            Backend::Kube(api) => match api.delete(name, &DeleteParams::default()).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    let mapped = Error::from_kube(self.kind, name, e);
                    if mapped.is_not_found() {
                        Ok(())
                    } else {
                        Err(mapped)
                    }
                }
            },
            #[cfg(test)]
            Backend::Fake(api) => api.delete(name),
        }
    }
}
