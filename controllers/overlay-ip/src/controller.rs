//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the phpIPAM
//! client and the Kubernetes stores into the reconciler and runs both
//! watchers:
//! - NodeOverlayIp: reserves and releases overlay IPs
//! - Node: provisions a NodeOverlayIp for every Node

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use controller_common::KubeStore;
use crds::NodeOverlayIp;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use phpipam_client::{IpamAllocator, IpamConfig, PhpIpamClient};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for overlay IP management.
pub struct Controller {
    overlay_ip_watcher: JoinHandle<Result<(), ControllerError>>,
    node_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(ipam_config: IpamConfig, concurrency: u16) -> Result<Self, ControllerError> {
        info!("Initializing overlay IP controller");

        let kube_client = Client::try_default().await?;

        info!("Authenticating against phpIPAM at {}", ipam_config.url);
        let phpipam = PhpIpamClient::connect(&ipam_config).await.map_err(|e| {
            error!("Failed to authenticate against phpIPAM: {}", e);
            error!("Please ensure:");
            error!("  1. {} / {} or the config file carry valid credentials", phpipam_client::config::USERNAME_ENV, phpipam_client::config::PASSWORD_ENV);
            error!("  2. phpIPAM is reachable at {}", ipam_config.url);
            ControllerError::Ipam(e)
        })?;
        let ipam = IpamAllocator::new(phpipam, ipam_config.subnet_map.clone());

        let overlay_ip_api: Api<NodeOverlayIp> = Api::all(kube_client.clone());
        let node_api: Api<Node> = Api::all(kube_client.clone());

        let reconciler = Arc::new(Reconciler::new(
            ipam,
            KubeStore::<NodeOverlayIp>::all(kube_client.clone()),
            KubeStore::<Node>::all(kube_client),
        ));

        let watcher_instance = Arc::new(Watcher::new(reconciler, overlay_ip_api, node_api, concurrency));

        let overlay_ip_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_node_overlay_ips().await })
        };

        let node_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_nodes().await })
        };

        Ok(Self {
            overlay_ip_watcher,
            node_watcher,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Overlay IP controller running");

        // Wait for any watcher to exit (they should run forever)
        tokio::select! {
            result = &mut self.overlay_ip_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NodeOverlayIp watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("NodeOverlayIp watcher error: {}", e)))?;
            }
            result = &mut self.node_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Node watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Node watcher error: {}", e)))?;
            }
        }

        Ok(())
    }
}
