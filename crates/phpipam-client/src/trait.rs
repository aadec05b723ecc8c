//! IPAM traits
//!
//! [`PhpIpamApi`] abstracts the raw phpIPAM REST calls so the allocation logic
//! can run against [`MockPhpIpam`](crate::MockPhpIpam) in tests.
//! [`IpamClient`] is the contract the controllers depend on.

use crate::error::IpamError;
use crate::models::{Address, Subnet, SubnetInfo};

/// Raw phpIPAM REST operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait PhpIpamApi: Send + Sync {
    /// Reserves the first free address of `subnet_id` for `owner`; returns the bare address.
    async fn reserve_first_free(&self, subnet_id: u64, owner: &str) -> Result<String, IpamError>;

    /// Fetches a subnet by ID.
    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, IpamError>;

    /// Searches address records by IP. A missing address is `IpamError::NotFound`.
    async fn search_address(&self, ip: &str) -> Result<Vec<Address>, IpamError>;

    /// Deletes an address record by ID.
    async fn delete_address(&self, address_id: &str) -> Result<(), IpamError>;
}

/// Overlay address allocation contract
#[async_trait::async_trait]
pub trait IpamClient: Send + Sync {
    /// Reserves an address for `owner` from the candidate subnets of `zone`.
    ///
    /// Returns the address in CIDR form (`10.1.2.3/24`).
    async fn reserve_ip_address(&self, owner: &str, zone: &str) -> Result<String, IpamError>;

    /// Looks up subnet, mask and gateway of the subnet holding `ip`.
    async fn get_subnet_for_ip(&self, ip: &str) -> Result<SubnetInfo, IpamError>;

    /// Releases the reservation of `ip`. Releasing an unknown address succeeds.
    async fn delete_ip_address(&self, ip: &str) -> Result<(), IpamError>;
}
