//! Node-to-NodeOverlayIp provisioner
//!
//! Every Node gets a NodeOverlayIp of the same name, owned by the Node so
//! it is garbage collected together with it.

use super::Reconciler;
use crate::error::ControllerError;
use controller_common::finalizer::is_deleting;
use crds::{
    NodeOverlayIp, NodeOverlayIpSpec, OVERLAY_NODE_LABEL, OVERLAY_REGION_LABEL, OVERLAY_ZONE_LABEL, node_region,
    node_zone,
};
use k8s_openapi::api::core::v1::Node;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

impl Reconciler {
    /// Ensures the Node named `name` has a NodeOverlayIp.
    pub async fn reconcile_node(&self, name: &str) -> Result<Action, ControllerError> {
        let Some(node) = self.nodes.get(name).await? else {
            debug!("Node {} no longer exists", name);
            return Ok(Action::await_change());
        };

        if is_deleting(&node) {
            debug!("Node {} is being deleted, not provisioning", name);
            return Ok(Action::await_change());
        }

        if self.overlay_ips.get(name).await?.is_some() {
            debug!("NodeOverlayIp {} already exists", name);
            return Ok(Action::await_change());
        }

        let overlay_ip = new_node_overlay_ip(&node)?;
        match self.overlay_ips.create(&overlay_ip).await {
            Ok(_) => info!("Created NodeOverlayIp {}", name),
            Err(e) if e.is_conflict() => debug!("NodeOverlayIp {} was created concurrently", name),
            Err(e) => return Err(e.into()),
        }

        Ok(Action::requeue(Duration::ZERO))
    }
}

/// Builds the NodeOverlayIp for `node`: same name, controller owner
/// reference to the node, and node/region/zone labels.
pub(crate) fn new_node_overlay_ip(node: &Node) -> Result<NodeOverlayIp, ControllerError> {
    let name = node.name_any();
    let owner = node
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::MissingField(format!("metadata.uid on Node {}", name)))?;

    let node_labels = node.labels();
    let labels = BTreeMap::from([
        (OVERLAY_NODE_LABEL.to_string(), name.clone()),
        (
            OVERLAY_REGION_LABEL.to_string(),
            node_region(node_labels).unwrap_or_default().to_string(),
        ),
        (
            OVERLAY_ZONE_LABEL.to_string(),
            node_zone(node_labels).unwrap_or_default().to_string(),
        ),
    ]);

    let mut overlay_ip = NodeOverlayIp::new(&name, NodeOverlayIpSpec::default());
    overlay_ip.metadata.labels = Some(labels);
    overlay_ip.metadata.owner_references = Some(vec![owner]);
    Ok(overlay_ip)
}
