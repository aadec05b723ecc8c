//! In-memory object store for unit testing
//!
//! Behaves like the API server where the controllers care about it:
//! - writes are rejected with [`StoreError::Conflict`] when the caller's
//!   `resourceVersion` is stale
//! - deleting an object with finalizers only marks it; it disappears once
//!   the last finalizer is removed
//! - [`MemoryStore::cascade_delete`] deletes dependents of an owner UID
//!
//! Every async call yields to the runtime first so concurrent reconciles
//! interleave the way they would against a real server.

use crate::store::{ObjectStore, StoreError};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Timestamp stamped on objects whose deletion was requested
const DELETION_TIMESTAMP: &str = "2024-01-01T00:00:00Z";

#[derive(Debug)]
struct Inner<K> {
    objects: BTreeMap<String, K>,
    version: u64,
    uid: u64,
    status_writes: usize,
    finalizer_writes: usize,
}

/// In-memory [`ObjectStore`]
#[derive(Debug)]
pub struct MemoryStore<K> {
    inner: Arc<Mutex<Inner<K>>>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                objects: BTreeMap::new(),
                version: 0,
                uid: 0,
                status_writes: 0,
                finalizer_writes: 0,
            })),
        }
    }
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Stores `obj` as-is (no version check), assigning UID and version.
    pub fn insert(&self, mut obj: K) -> K {
        let mut inner = self.lock();
        if obj.meta().uid.is_none() {
            inner.uid += 1;
            obj.meta_mut().uid = Some(format!("uid-{}", inner.uid));
        }
        inner.version += 1;
        obj.meta_mut().resource_version = Some(inner.version.to_string());
        inner.objects.insert(obj.name_any(), obj.clone());
        obj
    }

    /// Current copy of an object
    pub fn snapshot(&self, name: &str) -> Option<K> {
        self.lock().objects.get(name).cloned()
    }

    /// All objects, ordered by name
    pub fn list(&self) -> Vec<K> {
        self.lock().objects.values().cloned().collect()
    }

    /// Number of successful status writes
    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    /// Number of successful finalizer writes
    pub fn finalizer_writes(&self) -> usize {
        self.lock().finalizer_writes
    }

    /// Requests deletion of `name`. Returns `false` if it does not exist.
    ///
    /// Objects without finalizers are removed at once; others get a
    /// deletion timestamp and stay until their finalizers are cleared.
    pub fn request_delete(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(obj) = inner.objects.get(name).cloned() else {
            return false;
        };

        if obj.finalizers().is_empty() {
            inner.objects.remove(name);
            return true;
        }
        if obj.meta().deletion_timestamp.is_some() {
            return true;
        }

        let marked = serde_json::to_value(&obj).and_then(|mut value| {
            merge_patch(
                &mut value,
                &serde_json::json!({ "metadata": { "deletionTimestamp": DELETION_TIMESTAMP } }),
            );
            serde_json::from_value::<K>(value)
        });
        if let Ok(mut marked) = marked {
            inner.version += 1;
            marked.meta_mut().resource_version = Some(inner.version.to_string());
            inner.objects.insert(name.to_string(), marked);
        }
        true
    }

    /// Requests deletion of every object owned by `owner_uid`; returns how many.
    pub fn cascade_delete(&self, owner_uid: &str) -> usize {
        let dependents: Vec<String> = self
            .lock()
            .objects
            .values()
            .filter(|obj| obj.owner_references().iter().any(|r| r.uid == owner_uid))
            .map(ResourceExt::name_any)
            .collect();

        dependents.iter().filter(|name| self.request_delete(name)).count()
    }

    /// Checks the caller's version against the stored object.
    fn check_version(inner: &Inner<K>, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let current = inner
            .objects
            .get(&name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;

        if let Some(expected) = obj.meta().resource_version.as_deref() {
            if current.meta().resource_version.as_deref() != Some(expected) {
                return Err(StoreError::Conflict(format!(
                    "{}: version {} is stale",
                    name, expected
                )));
            }
        }
        Ok(current.clone())
    }

    /// Stores an updated object under a new version, finishing deletion if
    /// no finalizers remain.
    fn commit(inner: &mut Inner<K>, mut obj: K) -> K {
        inner.version += 1;
        obj.meta_mut().resource_version = Some(inner.version.to_string());

        let name = obj.name_any();
        if obj.meta().deletion_timestamp.is_some() && obj.finalizers().is_empty() {
            inner.objects.remove(&name);
        } else {
            inner.objects.insert(name, obj.clone());
        }
        obj
    }
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        tokio::task::yield_now().await;
        Ok(self.snapshot(name))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        tokio::task::yield_now().await;
        let name = obj.name_any();
        if self.lock().objects.contains_key(&name) {
            return Err(StoreError::Conflict(format!("{} already exists", name)));
        }

        let mut fresh = obj.clone();
        fresh.meta_mut().resource_version = None;
        fresh.meta_mut().uid = None;
        Ok(self.insert(fresh))
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K, StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let mut current = Self::check_version(&inner, obj)?;

        current.meta_mut().finalizers = Some(finalizers);
        inner.finalizer_writes += 1;
        Ok(Self::commit(&mut inner, current))
    }

    async fn patch_status(&self, obj: &K, status: Value) -> Result<K, StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let current = Self::check_version(&inner, obj)?;

        let mut value = serde_json::to_value(&current)?;
        merge_patch(&mut value, &serde_json::json!({ "status": status }));
        let updated: K = serde_json::from_value(value)?;

        inner.status_writes += 1;
        Ok(Self::commit(&mut inner, updated))
    }
}
