//! StaticRoute reconciler
//!
//! Installs every StaticRoute of this node's zone in the host routing
//! table and records `{hostname, gateway, device}` in `status.nodeStatus`.
//! Each agent only ever touches its own entry. The object keeps its
//! finalizer until every node has withdrawn its entry.
//!
//! Status writes are version-guarded. On a conflict the object is read
//! again and the pass recomputed, so entries written by other nodes in the
//! meantime are never overwritten. An object removed mid-pass ends the
//! reconcile the same way.

use super::{DEPENDENCY_REQUEUE, Reconciler};
use crate::error::ControllerError;
use controller_common::StoreError;
use controller_common::finalizer::{add_finalizer, has_finalizer, is_deleting, remove_finalizer};
use crds::{FINALIZER, StaticRoute, StaticRouteNodeStatus, StaticRouteStatus, ZONE_LABEL};
use ipnet::IpNet;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

/// Passes attempted within one reconcile before a conflict is handed to the error policy
const MAX_CONFLICT_RETRIES: u32 = 10;

impl Reconciler {
    /// Reconciles the StaticRoute named `name` on this host.
    pub async fn reconcile_static_route(&self, name: &str) -> Result<Action, ControllerError> {
        let mut attempt = 1;
        loop {
            match self.static_route_pass(name).await {
                Err(e) if (e.is_conflict() || e.is_not_found()) && attempt < MAX_CONFLICT_RETRIES => {
                    debug!("StaticRoute {} changed underneath (attempt {}), re-reading: {}", name, attempt, e);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn static_route_pass(&self, name: &str) -> Result<Action, ControllerError> {
        let Some(route) = self.static_routes.get(name).await? else {
            debug!("StaticRoute {} no longer exists", name);
            return Ok(Action::await_change());
        };

        if is_deleting(&route) {
            if has_finalizer(&route, FINALIZER) {
                self.withdraw_static_route(route).await?;
            }
            return Ok(Action::await_change());
        }

        let route = add_finalizer(self.static_routes.as_ref(), &route, FINALIZER).await?;

        // An empty zone label leaves the route unscoped.
        if let Some(zone) = route.labels().get(ZONE_LABEL).filter(|z| !z.is_empty()) {
            if self.config.zone.as_deref() != Some(zone.as_str()) {
                debug!("StaticRoute {} is scoped to zone {}, ignoring", name, zone);
                return Ok(Action::await_change());
            }
        }

        let subnet = &route.spec.subnet;
        subnet.parse::<IpNet>().map_err(|e| {
            ControllerError::InvalidConfig(format!("StaticRoute {} subnet {:?}: {}", name, subnet, e))
        })?;

        let Some(gateway) = self.resolve_gateway(&route).await? else {
            return Ok(Action::requeue(DEPENDENCY_REQUEUE));
        };

        self.network.ensure_route(subnet, &gateway).await?;
        let device = self.network.route_device(subnet).await?;

        let mut status = route.status_or_default();
        let changed = status.upsert(StaticRouteNodeStatus {
            hostname: self.config.hostname.clone(),
            gateway: gateway.clone(),
            device: device.clone(),
        });

        if changed {
            self.persist_route_status(&route, &status).await?;
            info!("Route {} via {} dev {} recorded on StaticRoute {}", subnet, gateway, device, name);
        } else {
            debug!("StaticRoute {} is up to date", name);
        }

        Ok(Action::await_change())
    }

    /// Gateway for `route`, or `None` while this node's overlay gateway is pending.
    ///
    /// Precedence: `spec.gateway`, then the gateway of this node's
    /// NodeOverlayIp, then the gateway the host uses for the private range.
    async fn resolve_gateway(&self, route: &StaticRoute) -> Result<Option<String>, ControllerError> {
        if let Some(gateway) = route.spec.gateway.as_deref().filter(|g| !g.is_empty()) {
            return Ok(Some(gateway.to_string()));
        }

        if self.overlay_ip_served {
            if let Some(overlay_ip) = self.overlay_ips.get(&self.config.hostname).await? {
                let gateway = overlay_ip.status_or_default().gateway;
                if gateway.is_empty() {
                    warn!(
                        "NodeOverlayIp {} has no gateway yet, StaticRoute {} waits",
                        self.config.hostname,
                        route.name_any()
                    );
                    return Ok(None);
                }
                return Ok(Some(gateway));
            }
        }

        Ok(Some(self.network.fallback_gateway().await?))
    }

    /// Delete path: withdraws this node's route and entry. Whichever agent
    /// finds the entry list empty releases the finalizer.
    async fn withdraw_static_route(&self, route: StaticRoute) -> Result<(), ControllerError> {
        let name = route.name_any();
        self.network.remove_route(&route.spec.subnet).await?;

        let mut status = route.status_or_default();
        if !status.node_status.is_empty() {
            if status.remove(&self.config.hostname) {
                self.persist_route_status(&route, &status).await?;
                info!("Withdrew route {} of StaticRoute {}", route.spec.subnet, name);
            }
            return Ok(());
        }

        remove_finalizer(self.static_routes.as_ref(), &route, FINALIZER).await?;
        info!("StaticRoute {} finalized", name);
        Ok(())
    }

    async fn persist_route_status(&self, route: &StaticRoute, status: &StaticRouteStatus) -> Result<(), ControllerError> {
        let patch = serde_json::to_value(status).map_err(StoreError::from)?;
        self.static_routes.patch_status(route, patch).await?;
        Ok(())
    }
}
