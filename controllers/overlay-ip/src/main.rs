//! Overlay IP Controller
//!
//! Control-plane controller for overlay addressing:
//! - NodeOverlayIp: reserves an overlay IP and its gateway in phpIPAM,
//!   releasing it when the object is deleted
//! - Node: creates a NodeOverlayIp for every Node, owned by the Node
//!
//! Configuration is read once at start-up from the environment and the
//! IPAM config file.

mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use phpipam_client::IpamConfig;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/opt/controller-config/overlay-ip-config.yaml";
const DEFAULT_CONCURRENCY: u16 = 4;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both use rustls; pin the ring provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting overlay IP controller");

    // Load configuration from environment variables
    let config_path = env::var("OVERLAY_IP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let concurrency = match env::var("RECONCILE_CONCURRENCY") {
        Ok(raw) => raw.parse::<u16>().map_err(|e| {
            ControllerError::InvalidConfig(format!("RECONCILE_CONCURRENCY={} is not a number: {}", raw, e))
        })?,
        Err(_) => DEFAULT_CONCURRENCY,
    };

    let ipam_config = IpamConfig::load(&config_path)?;

    info!("Configuration:");
    info!("  IPAM config: {}", config_path);
    info!("  phpIPAM URL: {}", ipam_config.url);
    info!("  Zones: {:?}", ipam_config.subnet_map.keys().collect::<Vec<_>>());
    info!("  Concurrency: {}", concurrency);

    // Initialize and run controller
    let controller = Controller::new(ipam_config, concurrency).await?;
    controller.run().await?;

    Ok(())
}
