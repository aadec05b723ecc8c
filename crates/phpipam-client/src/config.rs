//! IPAM configuration
//!
//! Loaded once at start-up from a YAML file:
//!
//! ```yaml
//! phpIPAM:
//!   url: https://ipam.example.com
//!   appID: overlay
//!   subnetMap:
//!     wdc04: [7, 8, 9]
//! ```
//!
//! `username` / `password` may be set in the file; otherwise they are taken
//! from `PHPIPAM_USERNAME` / `PHPIPAM_PASSWORD`.

use crate::error::IpamError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Environment variable holding the phpIPAM user name
pub const USERNAME_ENV: &str = "PHPIPAM_USERNAME";

/// Environment variable holding the phpIPAM password
pub const PASSWORD_ENV: &str = "PHPIPAM_PASSWORD";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(rename = "phpIPAM")]
    php_ipam: Option<IpamConfig>,
}

/// Immutable phpIPAM client configuration
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamConfig {
    /// Base URL of the phpIPAM server
    pub url: String,

    /// phpIPAM application ID
    #[serde(rename = "appID")]
    pub app_id: String,

    /// User name for token authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for token authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Zone to ordered candidate subnet IDs
    #[serde(default)]
    pub subnet_map: BTreeMap<String, Vec<u64>>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl fmt::Debug for IpamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpamConfig")
            .field("url", &self.url)
            .field("app_id", &self.app_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("subnet_map", &self.subnet_map)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl IpamConfig {
    /// Reads, completes and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IpamError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IpamError::InvalidConfig(format!("unable to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&raw)?.with_credentials_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses the `phpIPAM` section of a YAML document.
    pub fn from_yaml(raw: &str) -> Result<Self, IpamError> {
        let file: ConfigFile = serde_yaml::from_str(raw)
            .map_err(|e| IpamError::InvalidConfig(format!("invalid IPAM config: {}", e)))?;
        file.php_ipam
            .ok_or_else(|| IpamError::InvalidConfig("missing phpIPAM section".to_string()))
    }

    /// Fills unset credentials from `lookup` (normally the process environment).
    #[must_use]
    pub fn with_credentials_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.username.is_none() {
            self.username = lookup(USERNAME_ENV);
        }
        if self.password.is_none() {
            self.password = lookup(PASSWORD_ENV);
        }
        self
    }

    /// Rejects configurations the client cannot work with.
    pub fn validate(&self) -> Result<(), IpamError> {
        if self.url.trim().is_empty() {
            return Err(IpamError::InvalidConfig("phpIPAM url is empty".to_string()));
        }
        if self.app_id.trim().is_empty() {
            return Err(IpamError::InvalidConfig("phpIPAM appID is empty".to_string()));
        }
        if self.subnet_map.is_empty() {
            return Err(IpamError::InvalidConfig(
                "subnet map is empty; expected map of zones to subnet IDs".to_string(),
            ));
        }
        Ok(())
    }

    /// User name and password, empty when unset.
    pub fn credentials(&self) -> (&str, &str) {
        (
            self.username.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
        )
    }
}
