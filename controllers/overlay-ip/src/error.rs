//! Controller-specific error types.
//!
//! Wraps the library errors the reconcilers can hit so `error_policy` can
//! tell version conflicts apart from everything else.

use controller_common::StoreError;
use kube::Error as KubeError;
use phpipam_client::IpamError;
use thiserror::Error;

/// Errors that can occur in the overlay IP controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// phpIPAM error
    #[error("IPAM error: {0}")]
    Ipam(#[from] IpamError),

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
}
