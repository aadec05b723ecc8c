//! Test utilities for unit testing reconcilers
//!
//! Agents are built on a fake host and in-memory stores. Several agents can
//! share the same stores to play out multi-node scenarios.

use crate::config::AgentConfig;
use crate::reconciler::Reconciler;
use controller_common::MemoryStore;
use crds::*;
use host_network::{FakeIpRoute2, HostNetwork};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::time::Duration;

/// One agent plus handles on its host and the shared stores
pub struct TestEnv {
    pub reconciler: Reconciler,
    pub host: FakeIpRoute2,
    pub overlay_ips: MemoryStore<NodeOverlayIp>,
    pub static_routes: MemoryStore<StaticRoute>,
}

/// Configuration of an agent on `hostname` in `zone`
pub fn create_test_config(hostname: &str, zone: Option<&str>) -> AgentConfig {
    AgentConfig {
        hostname: hostname.to_string(),
        zone: zone.map(str::to_string),
        interface: "eth0".to_string(),
        interface_label: "overlay0".to_string(),
        ip_command_timeout: Duration::from_secs(10),
        concurrency: 4,
    }
}

/// Agent `node-a` in zone `wdc04`, NodeOverlayIp kind served
pub fn create_test_env() -> TestEnv {
    create_test_agent(
        create_test_config("node-a", Some("wdc04")),
        true,
        MemoryStore::new(),
        MemoryStore::new(),
    )
}

/// Agent with its own fake host on top of the given stores
pub fn create_test_agent(
    config: AgentConfig,
    overlay_ip_served: bool,
    overlay_ips: MemoryStore<NodeOverlayIp>,
    static_routes: MemoryStore<StaticRoute>,
) -> TestEnv {
    let host = FakeIpRoute2::new();
    let reconciler = Reconciler::new(
        HostNetwork::new(host.clone()),
        overlay_ips.clone(),
        static_routes.clone(),
        config,
        overlay_ip_served,
    );
    TestEnv {
        reconciler,
        host,
        overlay_ips,
        static_routes,
    }
}

/// Helper to create a test NodeOverlayIp with the given status
pub fn create_test_overlay_ip(name: &str, ip_addr: &str, gateway: &str) -> NodeOverlayIp {
    NodeOverlayIp {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            finalizers: Some(vec![FINALIZER.to_string()]),
            ..Default::default()
        },
        spec: NodeOverlayIpSpec::default(),
        status: Some(NodeOverlayIpStatus {
            ip_addr: ip_addr.to_string(),
            gateway: gateway.to_string(),
            ..Default::default()
        }),
    }
}

/// Helper to create a test StaticRoute, optionally pinned to a zone
pub fn create_test_route(name: &str, subnet: &str, gateway: Option<&str>, zone: Option<&str>) -> StaticRoute {
    StaticRoute {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: zone.map(|z| BTreeMap::from([(ZONE_LABEL.to_string(), z.to_string())])),
            ..Default::default()
        },
        spec: StaticRouteSpec {
            subnet: subnet.to_string(),
            gateway: gateway.map(str::to_string),
        },
        status: None,
    }
}
