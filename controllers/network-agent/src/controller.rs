//! Main controller implementation.
//!
//! Resolves the node's zone, probes whether the cluster serves the
//! NodeOverlayIp kind, and runs the watchers against the local host.

use crate::config::AgentConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use controller_common::{KubeStore, ObjectStore};
use crds::{NodeOverlayIp, StaticRoute, node_zone};
use host_network::{HostNetwork, IpCommand};
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Per-node network agent.
pub struct Controller {
    /// Absent when the cluster does not serve NodeOverlayIp
    overlay_ip_watcher: Option<JoinHandle<Result<(), ControllerError>>>,
    static_route_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: AgentConfig) -> Result<Self, ControllerError> {
        info!("Initializing network agent on {}", config.hostname);

        let kube_client = Client::try_default().await?;

        let config = match config.zone.clone() {
            Some(_) => config,
            None => {
                let zone = discover_zone(&kube_client, &config.hostname).await?;
                config.with_zone(zone)
            }
        };
        info!("  Zone: {}", config.zone.as_deref().unwrap_or("<none>"));

        let overlay_ip_served = overlay_ip_served(&kube_client).await;
        info!("  NodeOverlayIp served: {}", overlay_ip_served);

        let overlay_ip_api: Api<NodeOverlayIp> = Api::all(kube_client.clone());
        let static_route_api: Api<StaticRoute> = Api::all(kube_client.clone());

        let hostname = config.hostname.clone();
        let concurrency = config.concurrency;
        let reconciler = Arc::new(Reconciler::new(
            HostNetwork::new(IpCommand::new(config.ip_command_timeout)),
            KubeStore::<NodeOverlayIp>::all(kube_client.clone()),
            KubeStore::<StaticRoute>::all(kube_client),
            config,
            overlay_ip_served,
        ));

        let watcher_instance = Arc::new(Watcher::new(
            reconciler,
            overlay_ip_api,
            static_route_api,
            hostname,
            concurrency,
        ));

        let overlay_ip_watcher = overlay_ip_served.then(|| {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_overlay_interface().await })
        });

        let static_route_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_static_routes().await })
        };

        Ok(Self {
            overlay_ip_watcher,
            static_route_watcher,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Network agent running");

        let Self {
            overlay_ip_watcher,
            mut static_route_watcher,
        } = self;
        let overlay_ip_watcher = async move {
            match overlay_ip_watcher {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        };

        // Wait for any watcher to exit (they should run forever)
        tokio::select! {
            result = overlay_ip_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NodeOverlayIp watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("NodeOverlayIp watcher error: {}", e)))?;
            }
            result = &mut static_route_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("StaticRoute watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("StaticRoute watcher error: {}", e)))?;
            }
        }

        Ok(())
    }
}

/// Zone label of this node's Node object, if it has one.
async fn discover_zone(client: &Client, hostname: &str) -> Result<Option<String>, ControllerError> {
    let nodes = KubeStore::<Node>::all(client.clone());
    match nodes.get(hostname).await? {
        Some(node) => {
            let zone = node_zone(node.labels()).map(str::to_string);
            if zone.is_none() {
                warn!("Node {} has no zone label; zone-scoped StaticRoutes will be skipped", hostname);
            }
            Ok(zone)
        }
        None => {
            warn!("Node {} not found; zone-scoped StaticRoutes will be skipped", hostname);
            Ok(None)
        }
    }
}

/// Whether API discovery lists the NodeOverlayIp kind.
async fn overlay_ip_served(client: &Client) -> bool {
    let api_version = NodeOverlayIp::api_version(&());
    match client.list_api_group_resources(&api_version).await {
        Ok(list) => list.resources.iter().any(|r| r.name == NodeOverlayIp::plural(&())),
        Err(e) => {
            warn!("Discovery of {} failed, NodeOverlayIp not used: {}", api_version, e);
            false
        }
    }
}
