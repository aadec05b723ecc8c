//! Reconciliation logic for the network agent.
//!
//! - `overlay_interface`: overlay macvlan and address of this node
//! - `static_route`: cluster StaticRoutes installed on this node

pub mod overlay_interface;
#[cfg(test)]
mod overlay_interface_test;
pub mod static_route;

use crate::config::AgentConfig;
use controller_common::{BackoffTracker, ObjectStore};
use crds::{NodeOverlayIp, StaticRoute};
use host_network::NetworkApplier;
use std::sync::Arc;
use std::time::Duration;

/// Delay before looking again at an object waiting on another component
pub(crate) const DEPENDENCY_REQUEUE: Duration = Duration::from_secs(10);

/// Reconciles this node's NodeOverlayIp and every StaticRoute.
pub struct Reconciler {
    pub(crate) network: Arc<dyn NetworkApplier>,
    pub(crate) overlay_ips: Arc<dyn ObjectStore<NodeOverlayIp>>,
    pub(crate) static_routes: Arc<dyn ObjectStore<StaticRoute>>,
    pub(crate) config: AgentConfig,
    /// Whether the cluster serves the NodeOverlayIp kind
    pub(crate) overlay_ip_served: bool,
    /// Error count tracking per resource (kind/name -> backoff)
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("overlay_ip_served", &self.overlay_ip_served)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        network: impl NetworkApplier + 'static,
        overlay_ips: impl ObjectStore<NodeOverlayIp> + 'static,
        static_routes: impl ObjectStore<StaticRoute> + 'static,
        config: AgentConfig,
        overlay_ip_served: bool,
    ) -> Self {
        Self {
            network: Arc::new(network),
            overlay_ips: Arc::new(overlay_ips),
            static_routes: Arc::new(static_routes),
            config,
            overlay_ip_served,
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
