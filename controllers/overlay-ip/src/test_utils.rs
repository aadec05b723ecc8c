//! Test utilities for unit testing reconcilers
//!
//! Builds reconcilers on top of the in-memory store and phpIPAM mock, and
//! provides factories for the objects the tests feed them.

use crate::reconciler::Reconciler;
use controller_common::MemoryStore;
use crds::*;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use phpipam_client::{IpamAllocator, MockPhpIpam};
use std::collections::BTreeMap;

/// Reconciler plus handles on the backends it talks to
pub struct TestEnv {
    pub reconciler: Reconciler,
    pub ipam: MockPhpIpam,
    pub overlay_ips: MemoryStore<NodeOverlayIp>,
    pub nodes: MemoryStore<Node>,
}

/// Zone `wdc04` backed by subnets 7 and 8, both with free addresses and a gateway
pub fn create_test_env() -> TestEnv {
    let ipam = MockPhpIpam::new();
    ipam.add_subnet(7, "10.1.7.0/24", Some("10.1.7.1"), 10);
    ipam.add_subnet(8, "10.1.8.0/24", Some("10.1.8.1"), 10);
    create_test_env_with(ipam, BTreeMap::from([("wdc04".to_string(), vec![7, 8])]))
}

/// Environment around a pre-configured phpIPAM mock
pub fn create_test_env_with(ipam: MockPhpIpam, subnet_map: BTreeMap<String, Vec<u64>>) -> TestEnv {
    let overlay_ips = MemoryStore::new();
    let nodes = MemoryStore::new();
    let reconciler = Reconciler::new(
        IpamAllocator::new(ipam.clone(), subnet_map),
        overlay_ips.clone(),
        nodes.clone(),
    );
    TestEnv {
        reconciler,
        ipam,
        overlay_ips,
        nodes,
    }
}

/// Helper to create a test NodeOverlayIp labelled with `zone`
pub fn create_test_overlay_ip(name: &str, zone: &str) -> NodeOverlayIp {
    NodeOverlayIp {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([
                (OVERLAY_NODE_LABEL.to_string(), name.to_string()),
                (OVERLAY_ZONE_LABEL.to_string(), zone.to_string()),
            ])),
            ..Default::default()
        },
        spec: NodeOverlayIpSpec::default(),
        status: None,
    }
}

/// Helper to create a test Node with the given labels
pub fn create_test_node(name: &str, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}
