//! Overlay interface reconciler
//!
//! Brings the macvlan named by `INTERFACE_LABEL` up on top of `INTERFACE`
//! and assigns it the address reserved in this node's NodeOverlayIp.

use super::{DEPENDENCY_REQUEUE, Reconciler};
use crate::error::ControllerError;
use controller_common::finalizer::is_deleting;
use kube_runtime::controller::Action;
use serde_json::json;
use tracing::{debug, info};

impl Reconciler {
    /// Reconciles the NodeOverlayIp named `name` on this host.
    pub async fn reconcile_overlay_interface(&self, name: &str) -> Result<Action, ControllerError> {
        if name != self.config.hostname {
            debug!("NodeOverlayIp {} belongs to another node", name);
            return Ok(Action::await_change());
        }

        let Some(overlay_ip) = self.overlay_ips.get(name).await? else {
            debug!("NodeOverlayIp {} no longer exists", name);
            return Ok(Action::await_change());
        };
        let status = overlay_ip.status_or_default();

        if is_deleting(&overlay_ip) {
            if !status.interface_label.is_empty() {
                self.network.remove_overlay_device(&status.interface_label).await?;
                info!("Removed overlay device {}", status.interface_label);
            }
            return Ok(Action::await_change());
        }

        let (interface, label) = (&self.config.interface, &self.config.interface_label);
        self.network.ensure_overlay_device(interface, label).await?;

        if status.ip_addr.is_empty() {
            info!("NodeOverlayIp {} has no address yet, waiting", name);
            return Ok(Action::requeue(DEPENDENCY_REQUEUE));
        }

        self.network.ensure_address(label, &status.ip_addr).await?;

        if status.interface != *interface || status.interface_label != *label {
            // Merge patch: ipAddr and gateway stay as the control plane wrote them.
            let patch = json!({ "interface": interface, "interfaceLabel": label });
            self.overlay_ips.patch_status(&overlay_ip, patch).await?;
            info!("Recorded interface {}/{} on NodeOverlayIp {}", interface, label, name);
        } else {
            debug!("NodeOverlayIp {} is up to date", name);
        }

        Ok(Action::await_change())
    }
}
