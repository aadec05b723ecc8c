//! Idempotent host network primitives
//!
//! Each operation inspects current state first and only mutates what
//! differs, so calling it again with the same arguments changes nothing.

use crate::error::NetworkError;
use crate::parse::{self, LinkInfo, RouteInfo};
use crate::runner::{CommandOutput, CommandRunner};
use tracing::{debug, info};

/// Output fragments that mean the object is already gone
const ABSENT_SIGNATURES: &[&str] = &["does not exist", "Cannot find device"];

/// Target used to find the host's default path into the private network
pub const FALLBACK_ROUTE_TARGET: &str = "10.0.0.0/8";

/// Host network operations used by the node agent
#[async_trait::async_trait]
pub trait NetworkApplier: Send + Sync {
    /// Creates the macvlan device `label` on `parent` if missing and brings it up.
    async fn ensure_overlay_device(&self, parent: &str, label: &str) -> Result<(), NetworkError>;

    /// Deletes the device `label`; a missing device is success.
    async fn remove_overlay_device(&self, label: &str) -> Result<(), NetworkError>;

    /// Makes `cidr` the IPv4 address of `device`.
    async fn ensure_address(&self, device: &str, cidr: &str) -> Result<(), NetworkError>;

    /// Routes `subnet` via `gateway`, replacing a route via another gateway.
    async fn ensure_route(&self, subnet: &str, gateway: &str) -> Result<(), NetworkError>;

    /// Deletes the route for `subnet`; a missing route is success.
    async fn remove_route(&self, subnet: &str) -> Result<(), NetworkError>;

    /// Egress device the kernel picks for `subnet`.
    async fn route_device(&self, subnet: &str) -> Result<String, NetworkError>;

    /// Gateway the host uses for the private `10.0.0.0/8` range.
    async fn fallback_gateway(&self) -> Result<String, NetworkError>;
}

/// [`NetworkApplier`] backed by iproute2
#[derive(Debug, Clone)]
pub struct HostNetwork<R> {
    runner: R,
}

fn is_absent(output: &CommandOutput) -> bool {
    if output.success() {
        return false;
    }
    let text = output.combined();
    ABSENT_SIGNATURES.iter().any(|sig| text.contains(sig))
}

impl<R: CommandRunner> HostNetwork<R> {
    /// Applier running commands through `runner`
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Underlying command runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs a command and turns a non-zero exit into [`NetworkError::CommandFailed`].
    async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput, NetworkError> {
        let output = self.runner.run(args).await?;
        if !output.success() {
            return Err(NetworkError::CommandFailed {
                command: format!("ip {}", args.join(" ")),
                code: output.code,
                output: output.combined().trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn show_link(&self, label: &str) -> Result<Option<LinkInfo>, NetworkError> {
        let args = ["link", "show", label];
        let output = self.runner.run(&args).await?;
        if is_absent(&output) {
            return Ok(None);
        }
        if !output.success() {
            return Err(NetworkError::CommandFailed {
                command: format!("ip {}", args.join(" ")),
                code: output.code,
                output: output.combined().trim().to_string(),
            });
        }
        parse::parse_link(&output.stdout)
            .map(Some)
            .ok_or_else(|| NetworkError::UnexpectedOutput {
                command: format!("ip {}", args.join(" ")),
                output: output.stdout,
            })
    }

    async fn show_routes(&self, subnet: &str) -> Result<Vec<RouteInfo>, NetworkError> {
        let output = self.run_checked(&["route", "show", subnet]).await?;
        Ok(parse::parse_routes(&output.stdout))
    }

    async fn route_get(&self, target: &str) -> Result<RouteInfo, NetworkError> {
        let output = self.run_checked(&["route", "get", target]).await?;
        parse::parse_route_get(&output.stdout).ok_or_else(|| NetworkError::UnexpectedOutput {
            command: format!("ip route get {}", target),
            output: output.stdout,
        })
    }
}

#[async_trait::async_trait]
impl<R: CommandRunner> NetworkApplier for HostNetwork<R> {
    async fn ensure_overlay_device(&self, parent: &str, label: &str) -> Result<(), NetworkError> {
        let link = match self.show_link(label).await? {
            Some(link) => link,
            None => {
                info!("Creating macvlan device {} on {}", label, parent);
                self.run_checked(&["link", "add", label, "link", parent, "type", "macvlan"])
                    .await?;
                self.show_link(label).await?.ok_or_else(|| NetworkError::UnexpectedOutput {
                    command: format!("ip link show {}", label),
                    output: "device missing after create".to_string(),
                })?
            }
        };

        if link.is_down() {
            info!("Bringing up device {}", label);
            self.run_checked(&["link", "set", label, "up"]).await?;
        } else {
            debug!("Device {} is already up", label);
        }
        Ok(())
    }

    async fn remove_overlay_device(&self, label: &str) -> Result<(), NetworkError> {
        if self.show_link(label).await?.is_none() {
            debug!("Device {} is already deleted", label);
            return Ok(());
        }
        info!("Deleting device {}", label);
        self.run_checked(&["link", "del", label]).await?;
        Ok(())
    }

    async fn ensure_address(&self, device: &str, cidr: &str) -> Result<(), NetworkError> {
        let output = self.run_checked(&["addr", "show", device]).await?;
        let current = parse::parse_addresses(&output.stdout);

        if current.iter().any(|a| a.cidr == cidr) {
            debug!("IP {} is already set on device {}", cidr, device);
            return Ok(());
        }

        for stale in &current {
            info!("IP {} is currently set on device {}, removing", stale.cidr, device);
            self.run_checked(&["addr", "del", &stale.cidr, "dev", device]).await?;
        }

        info!("Adding IP {} to device {}", cidr, device);
        self.run_checked(&["addr", "add", cidr, "dev", device]).await?;
        Ok(())
    }

    async fn ensure_route(&self, subnet: &str, gateway: &str) -> Result<(), NetworkError> {
        let routes = self.show_routes(subnet).await?;

        if routes.iter().any(|r| r.gateway.as_deref() == Some(gateway)) {
            debug!("Route for {} via {} already exists", subnet, gateway);
            return Ok(());
        }

        for stale in &routes {
            match stale.gateway.as_deref() {
                Some(current) => {
                    info!("Replacing route for {} via {}", subnet, current);
                    self.run_checked(&["route", "del", subnet, "via", current]).await?;
                }
                None => {
                    info!("Replacing direct route for {}", subnet);
                    self.run_checked(&["route", "del", subnet]).await?;
                }
            }
        }

        info!("Adding route for {} via {}", subnet, gateway);
        self.run_checked(&["route", "add", subnet, "via", gateway]).await?;
        Ok(())
    }

    async fn remove_route(&self, subnet: &str) -> Result<(), NetworkError> {
        let routes = self.show_routes(subnet).await?;
        if routes.is_empty() {
            debug!("Route for {} already doesn't exist", subnet);
            return Ok(());
        }

        for route in &routes {
            info!("Deleting route for {}", subnet);
            match route.gateway.as_deref() {
                Some(via) => self.run_checked(&["route", "del", subnet, "via", via]).await?,
                None => self.run_checked(&["route", "del", subnet]).await?,
            };
        }
        Ok(())
    }

    async fn route_device(&self, subnet: &str) -> Result<String, NetworkError> {
        let route = self.route_get(subnet).await?;
        route.device.ok_or_else(|| NetworkError::UnexpectedOutput {
            command: format!("ip route get {}", subnet),
            output: "no device in route".to_string(),
        })
    }

    async fn fallback_gateway(&self) -> Result<String, NetworkError> {
        let route = self.route_get(FALLBACK_ROUTE_TARGET).await?;
        route.gateway.ok_or_else(|| NetworkError::UnexpectedOutput {
            command: format!("ip route get {}", FALLBACK_ROUTE_TARGET),
            output: "no gateway in route".to_string(),
        })
    }
}

#[cfg(test)]
#[path = "applier_test.rs"]
mod applier_test;
