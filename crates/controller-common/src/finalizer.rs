//! Finalizer helpers
//!
//! Finalizers are read from the object the caller already holds and written
//! back through [`ObjectStore::patch_finalizers`], so a concurrent change
//! surfaces as a conflict rather than being lost.

use crate::store::{ObjectStore, StoreError};
use kube::Resource;
use tracing::info;

/// Whether `obj` carries `finalizer`
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == finalizer))
}

/// Whether deletion of `obj` has been requested
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Adds `finalizer` to `obj`; returns the updated object.
///
/// Returns `obj` unchanged when the finalizer is already present.
pub async fn add_finalizer<K>(store: &dyn ObjectStore<K>, obj: &K, finalizer: &str) -> Result<K, StoreError>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    if has_finalizer(obj, finalizer) {
        return Ok(obj.clone());
    }

    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());

    let updated = store.patch_finalizers(obj, finalizers).await?;
    info!(
        "Added finalizer {} to {}",
        finalizer,
        obj.meta().name.as_deref().unwrap_or_default()
    );
    Ok(updated)
}

/// Removes `finalizer` from `obj`; returns the updated object.
///
/// Returns `obj` unchanged when the finalizer is not present.
pub async fn remove_finalizer<K>(store: &dyn ObjectStore<K>, obj: &K, finalizer: &str) -> Result<K, StoreError>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    if !has_finalizer(obj, finalizer) {
        return Ok(obj.clone());
    }

    let finalizers: Vec<String> = obj
        .meta()
        .finalizers
        .iter()
        .flatten()
        .filter(|s| *s != finalizer)
        .cloned()
        .collect();

    let updated = store.patch_finalizers(obj, finalizers).await?;
    info!(
        "Removed finalizer {} from {}",
        finalizer,
        obj.meta().name.as_deref().unwrap_or_default()
    );
    Ok(updated)
}
