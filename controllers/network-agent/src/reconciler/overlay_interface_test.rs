//! Unit tests for the overlay interface reconciler

#[cfg(test)]
mod tests {
    use crate::reconciler::DEPENDENCY_REQUEUE;
    use crate::test_utils::*;
    use kube_runtime::controller::Action;

    #[tokio::test]
    async fn test_reconcile_creates_device_and_address() {
        let env = create_test_env();
        env.overlay_ips
            .insert(create_test_overlay_ip("node-a", "10.1.8.10/24", "10.1.8.1"));

        let action = env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();
        assert_eq!(action, Action::await_change());

        assert_eq!(env.host.link_up("overlay0"), Some(true));
        assert_eq!(env.host.addresses("overlay0"), vec!["10.1.8.10/24".to_string()]);

        let status = env.overlay_ips.snapshot("node-a").unwrap().status.unwrap();
        assert_eq!(status.interface, "eth0");
        assert_eq!(status.interface_label, "overlay0");
        assert_eq!(status.ip_addr, "10.1.8.10/24");
        assert_eq!(status.gateway, "10.1.8.1");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let env = create_test_env();
        env.overlay_ips
            .insert(create_test_overlay_ip("node-a", "10.1.8.10/24", "10.1.8.1"));

        env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();
        let mutations = env.host.mutations();
        env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();

        assert_eq!(env.host.mutations(), mutations);
        assert_eq!(env.overlay_ips.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_other_node_is_ignored() {
        let env = create_test_env();
        env.overlay_ips
            .insert(create_test_overlay_ip("node-b", "10.1.8.11/24", "10.1.8.1"));

        env.reconciler.reconcile_overlay_interface("node-b").await.unwrap();

        assert!(env.host.commands().is_empty());
        assert_eq!(env.overlay_ips.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_address_requeues_after_device() {
        let env = create_test_env();
        env.overlay_ips.insert(create_test_overlay_ip("node-a", "", ""));

        let action = env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();
        assert_eq!(action, Action::requeue(DEPENDENCY_REQUEUE));

        assert_eq!(env.host.link_up("overlay0"), Some(true));
        assert!(env.host.addresses("overlay0").is_empty());
        assert_eq!(env.overlay_ips.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_address_change_replaces_old_address() {
        let env = create_test_env();
        env.host.add_link("overlay0", Some("eth0"), true);
        env.host.add_address("overlay0", "10.1.7.10/24");
        env.overlay_ips
            .insert(create_test_overlay_ip("node-a", "10.1.8.10/24", "10.1.8.1"));

        env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();

        assert_eq!(env.host.addresses("overlay0"), vec!["10.1.8.10/24".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_removes_device() {
        let env = create_test_env();
        env.overlay_ips
            .insert(create_test_overlay_ip("node-a", "10.1.8.10/24", "10.1.8.1"));
        env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();
        assert_eq!(env.host.link_up("overlay0"), Some(true));

        env.overlay_ips.request_delete("node-a");
        env.reconciler.reconcile_overlay_interface("node-a").await.unwrap();

        assert_eq!(env.host.link_up("overlay0"), None);
        // The finalizer belongs to the control plane.
        assert!(env.overlay_ips.snapshot("node-a").is_some());
    }

    #[tokio::test]
    async fn test_device_failure_is_an_error() {
        let env = create_test_env();
        env.host.fail_on("link add");
        env.overlay_ips
            .insert(create_test_overlay_ip("node-a", "10.1.8.10/24", "10.1.8.1"));

        let result = env.reconciler.reconcile_overlay_interface("node-a").await;
        assert!(result.is_err());
        assert_eq!(env.overlay_ips.status_writes(), 0);
    }
}
