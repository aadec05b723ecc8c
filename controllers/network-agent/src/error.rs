//! Controller-specific error types.

use controller_common::StoreError;
use host_network::NetworkError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the network agent.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Host network error
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Required field missing on a resource
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the failure was a stale-version write that should be retried at once
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_conflict())
    }

    /// Whether the object vanished between read and write
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::Store(StoreError::NotFound(_)))
    }
}
