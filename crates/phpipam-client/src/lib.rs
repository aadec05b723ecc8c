//! phpIPAM REST API Client
//!
//! Reserves, looks up and releases overlay addresses in phpIPAM.
//!
//! The crate is split in two layers:
//! - [`PhpIpamApi`]: the raw REST surface (first-free reservation, address
//!   search, address delete, subnet lookup), implemented by [`PhpIpamClient`].
//! - [`IpamClient`]: the allocation contract used by the controllers,
//!   implemented by [`IpamAllocator`] on top of any [`PhpIpamApi`].
//!
//! # Example
//!
//! ```no_run
//! use phpipam_client::{IpamAllocator, IpamClient, IpamConfig, PhpIpamClient};
//!
//! # async fn example() -> Result<(), phpipam_client::IpamError> {
//! let config = IpamConfig::load("/opt/controller-config/overlay-ip-config.yaml")?;
//! let client = PhpIpamClient::connect(&config).await?;
//! let ipam = IpamAllocator::new(client, config.subnet_map.clone());
//!
//! let cidr = ipam.reserve_ip_address("node-a", "wdc04").await?;
//! # let _ = cidr;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod ipam_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use allocator::IpamAllocator;
pub use client::PhpIpamClient;
pub use config::IpamConfig;
pub use error::IpamError;
pub use ipam_trait::{IpamClient, PhpIpamApi};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockCall, MockPhpIpam};
pub use models::*;
