//! StaticRoute CRD
//!
//! A cluster-wide route to a subnet. Every node agent installs the route
//! locally and records itself in `status.nodeStatus`; the list is keyed by
//! hostname.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "iks.ibm.com",
    version = "v1alpha1",
    kind = "StaticRoute",
    plural = "staticroutes",
    status = "StaticRouteStatus",
    printcolumn = r#"{"name":"SUBNET", "type":"string", "jsonPath":".spec.subnet"}"#,
    printcolumn = r#"{"name":"GATEWAY", "type":"string", "jsonPath":".spec.gateway"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StaticRouteSpec {
    /// Destination subnet in CIDR form
    pub subnet: String,

    /// Gateway the subnet is routed through (discovered when not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// Per-node record of an installed route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticRouteNodeStatus {
    /// Node that installed the route
    pub hostname: String,

    /// Gateway the route was installed through
    pub gateway: String,

    /// Egress device of the route on that node
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticRouteStatus {
    /// One entry per node that has the route installed
    #[serde(default)]
    pub node_status: Vec<StaticRouteNodeStatus>,
}

impl StaticRouteStatus {
    /// Entry for `hostname`, if present.
    pub fn entry(&self, hostname: &str) -> Option<&StaticRouteNodeStatus> {
        self.node_status.iter().find(|s| s.hostname == hostname)
    }

    /// Inserts or replaces the entry for `entry.hostname`.
    ///
    /// Returns `true` when the list changed. Any duplicate entries for the same
    /// hostname are collapsed into one.
    pub fn upsert(&mut self, entry: StaticRouteNodeStatus) -> bool {
        let position = self.node_status.iter().position(|s| s.hostname == entry.hostname);
        let mut merged: Vec<StaticRouteNodeStatus> = self
            .node_status
            .iter()
            .filter(|s| s.hostname != entry.hostname)
            .cloned()
            .collect();
        match position {
            Some(idx) => merged.insert(idx.min(merged.len()), entry),
            None => merged.push(entry),
        }

        if merged == self.node_status {
            return false;
        }
        self.node_status = merged;
        true
    }

    /// Removes every entry for `hostname`. Returns `true` when the list changed.
    pub fn remove(&mut self, hostname: &str) -> bool {
        let before = self.node_status.len();
        self.node_status.retain(|s| s.hostname != hostname);
        self.node_status.len() != before
    }
}

impl StaticRoute {
    /// Status of the object, or the empty status when none was written yet.
    pub fn status_or_default(&self) -> StaticRouteStatus {
        self.status.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(host: &str, gw: &str) -> StaticRouteNodeStatus {
        StaticRouteNodeStatus {
            hostname: host.to_string(),
            gateway: gw.to_string(),
            device: "eth1".to_string(),
        }
    }

    #[test]
    fn test_upsert_appends_then_replaces() {
        let mut status = StaticRouteStatus::default();
        assert!(status.upsert(entry("node-a", "10.0.0.1")));
        assert!(status.upsert(entry("node-b", "10.0.0.1")));
        assert!(!status.upsert(entry("node-a", "10.0.0.1")));

        assert!(status.upsert(entry("node-a", "10.0.0.254")));
        assert_eq!(status.node_status.len(), 2);
        assert_eq!(status.entry("node-a").unwrap().gateway, "10.0.0.254");
    }

    #[test]
    fn test_upsert_collapses_duplicates() {
        let mut status = StaticRouteStatus {
            node_status: vec![entry("node-a", "10.0.0.1"), entry("node-b", "10.0.0.1"), entry("node-a", "10.0.0.1")],
        };
        assert!(status.upsert(entry("node-a", "10.0.0.1")));
        assert_eq!(status.node_status.len(), 2);
        assert_eq!(status.node_status[0].hostname, "node-a");
    }

    #[test]
    fn test_remove_reports_change() {
        let mut status = StaticRouteStatus {
            node_status: vec![entry("node-a", "10.0.0.1"), entry("node-b", "10.0.0.1")],
        };
        assert!(status.remove("node-a"));
        assert!(!status.remove("node-a"));
        assert_eq!(status.node_status, vec![entry("node-b", "10.0.0.1")]);
    }

    #[test]
    fn test_spec_omits_unset_gateway() {
        let spec = StaticRouteSpec {
            subnet: "10.2.0.0/16".to_string(),
            gateway: None,
        };
        let json = serde_json::to_value(spec).unwrap();
        assert_eq!(json, serde_json::json!({"subnet": "10.2.0.0/16"}));
    }
}
