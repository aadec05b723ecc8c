//! Cluster object store
//!
//! Every write carries the `resourceVersion` the caller read, so a write
//! based on stale data fails with [`StoreError::Conflict`] instead of
//! overwriting someone else's change.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// Errors returned by [`ObjectStore`] implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// Write was based on an outdated version, or the object already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other API server error
    #[error("Kubernetes API error: {0}")]
    Kube(kube::Error),

    /// Object or patch could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the caller should re-read and retry immediately
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(err.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(err.to_string()),
            _ => StoreError::Kube(err),
        }
    }
}

/// Version-guarded access to one kind of cluster-scoped object
#[async_trait::async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Resource + Clone + Send + Sync + 'static,
{
    /// Fetches an object; `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError>;

    /// Creates an object. An existing object of the same name is a conflict.
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replaces `metadata.finalizers`, guarded by the version of `obj`.
    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K, StoreError>;

    /// Replaces the status subresource, guarded by the version of `obj`.
    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<K, StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore<K> {
    api: Api<K>,
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    /// Store over all objects of kind `K`
    pub fn all(client: Client) -> Self {
        Self { api: Api::all(client) }
    }

    /// Underlying API handle
    pub fn api(&self) -> &Api<K> {
        &self.api
    }
}

fn guarded_metadata<K: Resource>(obj: &K) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    if let Some(rv) = obj.resource_version() {
        metadata.insert("resourceVersion".to_string(), serde_json::Value::String(rv));
    }
    metadata
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        debug!("Creating {}", obj.name_any());
        Ok(self.api.create(&PostParams::default(), obj).await?)
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K, StoreError> {
        let mut metadata = guarded_metadata(obj);
        metadata.insert("finalizers".to_string(), serde_json::to_value(finalizers)?);
        let patch = serde_json::json!({ "metadata": metadata });

        Ok(self
            .api
            .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<K, StoreError> {
        let patch = serde_json::json!({
            "metadata": guarded_metadata(obj),
            "status": status,
        });

        Ok(self
            .api
            .patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}
