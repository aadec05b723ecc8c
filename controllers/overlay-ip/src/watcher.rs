//! Kubernetes resource watchers.
//!
//! This module handles watching Kubernetes resources for changes
//! and triggering reconciliation using kube_runtime::Controller.
//!
//! Both watchers go through the generic `watch_resource()` helper, which
//! reconciles by object name and applies the per-object backoff.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::NodeOverlayIp;
use futures::StreamExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay before retrying a write that lost an optimistic concurrency race
const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Reconcile entry point of one kind: (reconciler, object name) -> action
type ReconcileFn = fn(Arc<Reconciler>, String) -> BoxFuture<'static, Result<Action, ControllerError>>;

/// Generic watcher helper around kube_runtime::Controller.
///
/// The controller handles reconnection and keeps at most one reconcile in
/// flight per object. Successful reconciles reset the object's backoff;
/// version conflicts requeue after a second; every other error requeues
/// after the next Fibonacci delay for that object.
async fn watch_resource<K>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: ReconcileFn,
    resource_name: &'static str,
    concurrency: u16,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = format!("{}/{}", resource_name, obj.name_any());
        if error.is_conflict() {
            debug!("Version conflict on {}, retrying: {}", key, error);
            return Action::requeue(CONFLICT_REQUEUE);
        }
        let (delay, error_count) = ctx.next_backoff(&key);
        warn!(
            "Reconciliation error for {} (attempt {}), retrying in {}s: {}",
            key,
            error_count,
            delay.as_secs(),
            error
        );
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let name = obj.name_any();
        let key = format!("{}/{}", resource_name, name);
        async move {
            debug!("Reconciling {}", key);
            match reconcile_fn(ctx.clone(), name).await {
                Ok(action) => {
                    ctx.reset_backoff(&key);
                    Ok(action)
                }
                Err(e) => {
                    error!("Reconciliation failed for {}: {}", key, e);
                    Err(e)
                }
            }
        }
    };

    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_millis(500))
        .concurrency(concurrency);

    controller
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                debug!("Controller event for {}: {}", resource_name, e);
            }
        })
        .await;

    info!("{} watcher stopped", resource_name);
    Ok(())
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    overlay_ip_api: Api<NodeOverlayIp>,
    node_api: Api<Node>,
    concurrency: u16,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        overlay_ip_api: Api<NodeOverlayIp>,
        node_api: Api<Node>,
        concurrency: u16,
    ) -> Self {
        Self {
            reconciler,
            overlay_ip_api,
            node_api,
            concurrency,
        }
    }

    /// Starts watching NodeOverlayIp resources.
    pub async fn watch_node_overlay_ips(&self) -> Result<(), ControllerError> {
        watch_resource(
            Controller::new(self.overlay_ip_api.clone(), watcher::Config::default()),
            self.reconciler.clone(),
            |reconciler, name| Box::pin(async move { reconciler.reconcile_node_overlay_ip(&name).await }),
            "NodeOverlayIp",
            self.concurrency,
        )
        .await
    }

    /// Starts watching Nodes, and the NodeOverlayIps they own.
    pub async fn watch_nodes(&self) -> Result<(), ControllerError> {
        watch_resource(
            Controller::new(self.node_api.clone(), watcher::Config::default())
                .owns(self.overlay_ip_api.clone(), watcher::Config::default()),
            self.reconciler.clone(),
            |reconciler, name| Box::pin(async move { reconciler.reconcile_node(&name).await }),
            "Node",
            self.concurrency,
        )
        .await
    }
}
