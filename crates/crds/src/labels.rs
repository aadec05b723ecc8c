//! Well-known label keys
//!
//! Node topology labels are read from both the legacy `failure-domain` keys and
//! the current `topology.kubernetes.io` keys.

use std::collections::BTreeMap;

/// Legacy zone label, also used on `StaticRoute` objects to scope them to a zone.
pub const ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";

/// Legacy region label.
pub const REGION_LABEL: &str = "failure-domain.beta.kubernetes.io/region";

/// Current zone label.
pub const TOPOLOGY_ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// Current region label.
pub const TOPOLOGY_REGION_LABEL: &str = "topology.kubernetes.io/region";

/// `NodeOverlayIp` label holding the node name.
pub const OVERLAY_NODE_LABEL: &str = "node";

/// `NodeOverlayIp` label holding the node region.
pub const OVERLAY_REGION_LABEL: &str = "region";

/// `NodeOverlayIp` label holding the node zone; selects the IPAM subnet candidates.
pub const OVERLAY_ZONE_LABEL: &str = "zone";

/// Zone of a node, preferring the legacy label.
pub fn node_zone(labels: &BTreeMap<String, String>) -> Option<&str> {
    first_non_empty(labels, &[ZONE_LABEL, TOPOLOGY_ZONE_LABEL])
}

/// Region of a node, preferring the legacy label.
pub fn node_region(labels: &BTreeMap<String, String>) -> Option<&str> {
    first_non_empty(labels, &[REGION_LABEL, TOPOLOGY_REGION_LABEL])
}

fn first_non_empty<'a>(labels: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| labels.get(*k))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}
