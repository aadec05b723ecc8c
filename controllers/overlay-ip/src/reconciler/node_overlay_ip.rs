//! NodeOverlayIp reconciler
//!
//! Owns the phpIPAM reservation behind `status.ipAddr`:
//! - a live object gets an address from the candidate subnets of its `zone`
//!   label plus the gateway of that subnet
//! - a deleted object has its address released before the finalizer goes

use super::Reconciler;
use crate::error::ControllerError;
use controller_common::StoreError;
use controller_common::finalizer::{add_finalizer, has_finalizer, is_deleting, remove_finalizer};
use crds::{FINALIZER, NodeOverlayIp, NodeOverlayIpStatus, OVERLAY_ZONE_LABEL};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, error, info, warn};

impl Reconciler {
    /// Reconciles the NodeOverlayIp named `name`.
    pub async fn reconcile_node_overlay_ip(&self, name: &str) -> Result<Action, ControllerError> {
        let Some(overlay_ip) = self.overlay_ips.get(name).await? else {
            debug!("NodeOverlayIp {} no longer exists", name);
            return Ok(Action::await_change());
        };

        if is_deleting(&overlay_ip) {
            if has_finalizer(&overlay_ip, FINALIZER) {
                self.finalize_node_overlay_ip(overlay_ip).await?;
            }
            return Ok(Action::await_change());
        }

        let overlay_ip = add_finalizer(self.overlay_ips.as_ref(), &overlay_ip, FINALIZER).await?;

        let current = overlay_ip.status_or_default();
        let mut desired = current.clone();
        let mut reserved_now = false;

        if desired.ip_addr.is_empty() {
            let zone = overlay_ip
                .labels()
                .get(OVERLAY_ZONE_LABEL)
                .filter(|z| !z.is_empty())
                .ok_or_else(|| {
                    ControllerError::MissingField(format!("label {} on NodeOverlayIp {}", OVERLAY_ZONE_LABEL, name))
                })?;

            desired.ip_addr = self.ipam.reserve_ip_address(name, zone).await?;
            reserved_now = true;
            info!("Reserved IP {} for NodeOverlayIp {} in zone {}", desired.ip_addr, name, zone);
        }

        if desired.gateway.is_empty() {
            if let Some(address) = desired.address().map(str::to_string) {
                match self.ipam.get_subnet_for_ip(&address).await {
                    Ok(subnet) => {
                        info!("Gateway {} set for NodeOverlayIp {}", subnet.gateway, name);
                        desired.gateway = subnet.gateway;
                    }
                    Err(e) => {
                        warn!("Failed to find gateway for {} ({}): {}", name, address, e);
                        // Keep the reservation on record even without a gateway.
                        if desired != current {
                            self.persist_overlay_status(&overlay_ip, &desired, reserved_now).await?;
                        }
                        return Err(e.into());
                    }
                }
            }
        }

        if desired == current {
            debug!("NodeOverlayIp {} is up to date", name);
        } else {
            self.persist_overlay_status(&overlay_ip, &desired, reserved_now).await?;
            info!("Updated status of NodeOverlayIp {}", name);
        }

        Ok(Action::await_change())
    }

    /// Writes `status`. If the write fails right after a reservation, the
    /// reservation is handed back so the retry does not leak an address.
    async fn persist_overlay_status(
        &self,
        overlay_ip: &NodeOverlayIp,
        status: &NodeOverlayIpStatus,
        reserved_now: bool,
    ) -> Result<NodeOverlayIp, ControllerError> {
        let patch = serde_json::to_value(status).map_err(StoreError::from)?;
        match self.overlay_ips.patch_status(overlay_ip, patch).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                if reserved_now {
                    if let Some(address) = status.address() {
                        warn!(
                            "Releasing {} after failed status update of {}: {}",
                            address,
                            overlay_ip.name_any(),
                            e
                        );
                        if let Err(release_err) = self.ipam.delete_ip_address(address).await {
                            error!("Failed to release {}: {}", address, release_err);
                        }
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Releases the reservation of a deleted NodeOverlayIp and drops its finalizer.
    async fn finalize_node_overlay_ip(&self, overlay_ip: NodeOverlayIp) -> Result<(), ControllerError> {
        let name = overlay_ip.name_any();
        let status = overlay_ip.status_or_default();

        let overlay_ip = match status.address() {
            Some(address) => {
                if let Err(e) = self.ipam.delete_ip_address(address).await {
                    error!(
                        "Failed to release IP {} of NodeOverlayIp {}; finalizer kept: {}",
                        address, name, e
                    );
                    return Err(e.into());
                }
                info!("Released IP {} of NodeOverlayIp {}", address, name);

                let cleared = NodeOverlayIpStatus {
                    ip_addr: String::new(),
                    gateway: String::new(),
                    ..status
                };
                let patch = serde_json::to_value(&cleared).map_err(StoreError::from)?;
                self.overlay_ips.patch_status(&overlay_ip, patch).await?
            }
            None => overlay_ip,
        };

        remove_finalizer(self.overlay_ips.as_ref(), &overlay_ip, FINALIZER).await?;
        info!("NodeOverlayIp {} finalized", name);
        Ok(())
    }
}
