//! Overlay network CRD definitions
//!
//! Kubernetes Custom Resource Definitions shared by the overlay IP controller
//! and the per-node network agent.

pub mod labels;
pub mod node_overlay_ip;
pub mod static_route;

pub use labels::*;
pub use node_overlay_ip::*;
pub use static_route::*;

/// API group served by both custom resources.
pub const API_GROUP: &str = "iks.ibm.com";

/// Finalizer placed on every custom resource managed by these controllers.
pub const FINALIZER: &str = "finalizer.iks.ibm.com";
