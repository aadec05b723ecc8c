//! Host Network Applier
//!
//! Idempotent management of the overlay macvlan device, its address and
//! static routes on the local host, driven through the `ip` command.
//!
//! ```no_run
//! use host_network::{HostNetwork, IpCommand, NetworkApplier};
//!
//! # async fn example() -> Result<(), host_network::NetworkError> {
//! let host = HostNetwork::new(IpCommand::default());
//! host.ensure_overlay_device("eth0", "overlay0").await?;
//! host.ensure_address("overlay0", "10.1.8.10/24").await?;
//! # Ok(())
//! # }
//! ```

pub mod applier;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod parse;
pub mod runner;

pub use applier::{HostNetwork, NetworkApplier};
pub use error::NetworkError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::FakeIpRoute2;
pub use parse::{AddressInfo, LinkInfo, RouteInfo};
pub use runner::{CommandOutput, CommandRunner, IpCommand};
