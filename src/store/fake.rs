//! In-memory `Store` backend used by unit tests, so the wait/retry engines
//! and all eight primitive engines can be exercised without a live
//! apiserver.

use crate::error::{Error, Result};
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FakeApi<T> {
    objects: Arc<Mutex<HashMap<String, T>>>,
    next_version: Arc<AtomicU64>,
}

impl<T> FakeApi<T>
where
    T: Resource<DynamicType = ()> + Clone,
{
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            next_version: Arc::new(AtomicU64::new(1)),
        }
    }

    fn alloc_version(&self) -> String {
        self.next_version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    pub fn get(&self, kind: &'static str, name: &str) -> Result<T> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(kind, name.to_string()))
    }

    pub fn list(&self, label_selector: Option<&str>) -> Vec<T> {
        let objects = self.objects.lock().unwrap();
        let mut items: Vec<T> = match label_selector {
            None => objects.values().cloned().collect(),
            Some(sel) => {
                let (key, value) = sel.split_once('=').unwrap_or((sel, ""));
                objects
                    .values()
                    .filter(|obj| obj.labels().get(key).map(String::as_str) == Some(value))
                    .cloned()
                    .collect()
            }
        };
        items.sort_by_key(|o| o.name_any());
        items
    }

    pub fn create(&self, kind: &'static str, mut obj: T) -> Result<T> {
        let name = obj.name_any();
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&name) {
            return Err(Error::AlreadyExists(kind, name));
        }
        obj.meta_mut().resource_version = Some(self.alloc_version());
        objects.insert(name, obj.clone());
        Ok(obj)
    }

    /// Shared by both spec `update` and `status_update`: the fake doesn't
    /// model the two subresources as genuinely independent version
    /// counters, since tests only assert conflict/success, not which
    /// subresource advanced.
    pub fn update(&self, kind: &'static str, mut obj: T) -> Result<T> {
        let name = obj.name_any();
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(&name)
            .ok_or_else(|| Error::NotFound(kind, name.clone()))?;
        if current.resource_version() != obj.resource_version() {
            return Err(Error::Conflict(kind, name));
        }
        obj.meta_mut().resource_version = Some(self.alloc_version());
        objects.insert(name, obj.clone());
        Ok(obj)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }
}
