//! Unit tests for the Node provisioner

#[cfg(test)]
mod tests {
    use crate::reconciler::node::new_node_overlay_ip;
    use crate::test_utils::*;
    use crds::{OVERLAY_NODE_LABEL, OVERLAY_REGION_LABEL, OVERLAY_ZONE_LABEL, REGION_LABEL, TOPOLOGY_ZONE_LABEL, ZONE_LABEL};
    use kube::ResourceExt;
    use kube_runtime::controller::Action;
    use std::time::Duration;

    #[tokio::test]
    async fn test_provision_creates_owned_overlay_ip() {
        let env = create_test_env();
        let node = env
            .nodes
            .insert(create_test_node("node-a", &[(ZONE_LABEL, "wdc04"), (REGION_LABEL, "us-east")]));

        let action = env.reconciler.reconcile_node("node-a").await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));

        let overlay_ip = env.overlay_ips.snapshot("node-a").unwrap();
        let labels = overlay_ip.labels();
        assert_eq!(labels[OVERLAY_NODE_LABEL], "node-a");
        assert_eq!(labels[OVERLAY_ZONE_LABEL], "wdc04");
        assert_eq!(labels[OVERLAY_REGION_LABEL], "us-east");

        let owners = overlay_ip.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Node");
        assert_eq!(owners[0].name, "node-a");
        assert_eq!(Some(owners[0].uid.clone()), node.metadata.uid);
        assert_eq!(owners[0].controller, Some(true));
    }

    #[tokio::test]
    async fn test_provision_existing_overlay_ip_is_noop() {
        let env = create_test_env();
        env.nodes.insert(create_test_node("node-a", &[(ZONE_LABEL, "wdc04")]));
        let existing = env.overlay_ips.insert(create_test_overlay_ip("node-a", "wdc04"));

        let action = env.reconciler.reconcile_node("node-a").await.unwrap();
        assert_eq!(action, Action::await_change());

        let current = env.overlay_ips.snapshot("node-a").unwrap();
        assert_eq!(current.metadata.resource_version, existing.metadata.resource_version);
        assert!(current.owner_references().is_empty());
    }

    #[tokio::test]
    async fn test_provision_missing_node_is_noop() {
        let env = create_test_env();
        let action = env.reconciler.reconcile_node("ghost").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(env.overlay_ips.list().is_empty());
    }

    #[test]
    fn test_topology_zone_label_is_used_as_fallback() {
        let mut node = create_test_node("node-b", &[(TOPOLOGY_ZONE_LABEL, "wdc06")]);
        node.metadata.uid = Some("node-b-uid".to_string());

        let overlay_ip = new_node_overlay_ip(&node).unwrap();
        assert_eq!(overlay_ip.labels()[OVERLAY_ZONE_LABEL], "wdc06");
        assert_eq!(overlay_ip.labels()[OVERLAY_REGION_LABEL], "");
    }

    #[test]
    fn test_node_without_uid_cannot_own() {
        let node = create_test_node("node-b", &[]);
        assert!(new_node_overlay_ip(&node).is_err());
    }

    #[tokio::test]
    async fn test_node_deletion_cascades_and_releases_ip() {
        let env = create_test_env();
        let node = env.nodes.insert(create_test_node("node-a", &[(ZONE_LABEL, "wdc04")]));

        env.reconciler.reconcile_node("node-a").await.unwrap();
        env.reconciler.reconcile_node_overlay_ip("node-a").await.unwrap();
        assert_eq!(env.ipam.reservations_owned_by("node-a").len(), 1);

        // garbage collection of the node's dependents
        env.nodes.request_delete("node-a");
        let node_uid = node.metadata.uid.unwrap();
        assert_eq!(env.overlay_ips.cascade_delete(&node_uid), 1);
        assert!(env.overlay_ips.snapshot("node-a").is_some(), "finalizer holds the object");

        env.reconciler.reconcile_node_overlay_ip("node-a").await.unwrap();
        assert!(env.overlay_ips.snapshot("node-a").is_none());
        assert!(env.ipam.reservations_owned_by("node-a").is_empty());

        // provisioner does nothing for the vanished node
        env.reconciler.reconcile_node("node-a").await.unwrap();
        assert!(env.overlay_ips.list().is_empty());
    }
}
