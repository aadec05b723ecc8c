//! Agent configuration, read once from the environment at start-up.

use crate::error::ControllerError;
use std::time::Duration;

const DEFAULT_INTERFACE: &str = "eth0";
const DEFAULT_INTERFACE_LABEL: &str = "overlay0";
const DEFAULT_IP_COMMAND_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONCURRENCY: u16 = 4;

/// Local identity and host settings of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Name of this node; NodeOverlayIps of other nodes are ignored
    pub hostname: String,
    /// Zone of this node, used to scope StaticRoutes
    pub zone: Option<String>,
    /// Parent device of the overlay macvlan
    pub interface: String,
    /// Name of the overlay macvlan
    pub interface_label: String,
    /// Timeout of a single `ip` invocation
    pub ip_command_timeout: Duration,
    /// Concurrent reconciles per watched kind
    pub concurrency: u16,
}

impl AgentConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let hostname = get("NODE_HOSTNAME")
            .ok_or_else(|| ControllerError::InvalidConfig("NODE_HOSTNAME is required".to_string()))?;

        let ip_command_timeout = match get("IP_COMMAND_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("IP_COMMAND_TIMEOUT_SECS={} is not a number: {}", raw, e))
            })?),
            None => Duration::from_secs(DEFAULT_IP_COMMAND_TIMEOUT_SECS),
        };

        let concurrency = match get("RECONCILE_CONCURRENCY") {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                ControllerError::InvalidConfig(format!("RECONCILE_CONCURRENCY={} is not a number: {}", raw, e))
            })?,
            None => DEFAULT_CONCURRENCY,
        };

        Ok(Self {
            hostname,
            zone: get("NODE_ZONE"),
            interface: get("INTERFACE").unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
            interface_label: get("INTERFACE_LABEL").unwrap_or_else(|| DEFAULT_INTERFACE_LABEL.to_string()),
            ip_command_timeout,
            concurrency,
        })
    }

    /// Same configuration with the zone discovered from the Node object.
    pub fn with_zone(mut self, zone: Option<String>) -> Self {
        self.zone = zone;
        self
    }
}
