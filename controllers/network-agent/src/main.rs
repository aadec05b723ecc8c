//! Network Agent
//!
//! Runs on every node and applies cluster intent to the local host:
//! - NodeOverlayIp (this node only): macvlan overlay device and its address
//! - StaticRoute: routes through the explicit, overlay or host gateway,
//!   recorded per node in the object's status
//!
//! Host changes go through the `ip` command, so the agent needs
//! CAP_NET_ADMIN in the host network namespace.

mod config;
mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::AgentConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube uses rustls; pin the ring provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting network agent");

    // Load configuration from environment variables
    let config = AgentConfig::from_env()?;

    info!("Configuration:");
    info!("  Hostname: {}", config.hostname);
    info!("  Interface: {} (overlay {})", config.interface, config.interface_label);
    info!("  ip command timeout: {}s", config.ip_command_timeout.as_secs());
    info!("  Concurrency: {}", config.concurrency);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
