//! Reconciliation logic for the overlay IP controller.
//!
//! - `node_overlay_ip`: reserves and releases overlay IPs in phpIPAM
//! - `node`: provisions one NodeOverlayIp per Node

pub mod node;
pub mod node_overlay_ip;
#[cfg(test)]
mod node_test;

use controller_common::{BackoffTracker, ObjectStore};
use crds::NodeOverlayIp;
use k8s_openapi::api::core::v1::Node;
use phpipam_client::IpamClient;
use std::sync::Arc;
use std::time::Duration;

/// Reconciles NodeOverlayIp and Node resources.
pub struct Reconciler {
    pub(crate) ipam: Arc<dyn IpamClient>,
    pub(crate) overlay_ips: Arc<dyn ObjectStore<NodeOverlayIp>>,
    pub(crate) nodes: Arc<dyn ObjectStore<Node>>,
    /// Error count tracking per resource (kind/name -> backoff)
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        ipam: impl IpamClient + 'static,
        overlay_ips: impl ObjectStore<NodeOverlayIp> + 'static,
        nodes: impl ObjectStore<Node> + 'static,
    ) -> Self {
        Self {
            ipam: Arc::new(ipam),
            overlay_ips: Arc::new(overlay_ips),
            nodes: Arc::new(nodes),
            backoff: BackoffTracker::new(),
        }
    }

    /// Records a failed reconcile and returns (delay, consecutive errors).
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        self.backoff.next_backoff(resource_key)
    }

    /// Clears the error count after a successful reconcile.
    pub fn reset_backoff(&self, resource_key: &str) {
        self.backoff.reset(resource_key);
    }
}
