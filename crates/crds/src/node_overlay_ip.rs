//! NodeOverlayIp CRD
//!
//! One object per node, named after the node. The control-plane controller
//! fills in the reserved address and gateway; the node agent fills in the
//! interface it configured.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "iks.ibm.com",
    version = "v1alpha1",
    kind = "NodeOverlayIp",
    plural = "nodeoverlayips",
    status = "NodeOverlayIpStatus",
    printcolumn = r#"{"name":"IP", "type":"string", "jsonPath":".status.ipAddr"}"#,
    printcolumn = r#"{"name":"GATEWAY", "type":"string", "jsonPath":".status.gateway"}"#,
    printcolumn = r#"{"name":"INTERFACE", "type":"string", "jsonPath":".status.interfaceLabel"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverlayIpSpec {}

/// Observed state of a node's overlay address.
///
/// Empty strings mean "not set yet". Fields are always serialized so that a
/// status write can clear them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverlayIpStatus {
    /// Address reserved in IPAM, in CIDR form (e.g. `10.1.2.3/24`)
    #[serde(default)]
    pub ip_addr: String,

    /// Gateway of the subnet containing `ip_addr`
    #[serde(default)]
    pub gateway: String,

    /// Host device the overlay interface rides on
    #[serde(default)]
    pub interface: String,

    /// Name of the overlay (macvlan) interface
    #[serde(default)]
    pub interface_label: String,
}

impl NodeOverlayIpStatus {
    /// The reserved address without its prefix length, if one is reserved.
    pub fn address(&self) -> Option<&str> {
        if self.ip_addr.is_empty() {
            return None;
        }
        Some(self.ip_addr.split('/').next().unwrap_or(&self.ip_addr))
    }
}

impl NodeOverlayIp {
    /// Status of the object, or the empty status when none was written yet.
    pub fn status_or_default(&self) -> NodeOverlayIpStatus {
        self.status.clone().unwrap_or_default()
    }
}
