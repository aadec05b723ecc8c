//! Zone-aware overlay address allocation
//!
//! Maps a zone to an ordered list of candidate phpIPAM subnets and reserves
//! from the first one that still has a free address.

use crate::error::IpamError;
use crate::ipam_trait::{IpamClient, PhpIpamApi};
use crate::models::SubnetInfo;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// [`IpamClient`] implementation on top of a raw [`PhpIpamApi`]
#[derive(Debug)]
pub struct IpamAllocator<A> {
    api: A,
    subnet_map: BTreeMap<String, Vec<u64>>,
}

impl<A: PhpIpamApi> IpamAllocator<A> {
    /// Creates an allocator for the given zone to subnet-ID map.
    pub fn new(api: A, subnet_map: BTreeMap<String, Vec<u64>>) -> Self {
        Self { api, subnet_map }
    }

    /// Raw API used by this allocator
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Reserves from one subnet and returns the address with its prefix length.
    async fn reserve_in_subnet(&self, subnet_id: u64, owner: &str) -> Result<String, IpamError> {
        let ip = self.api.reserve_first_free(subnet_id, owner).await?;
        debug!("Reserved {} in subnet {} for {}", ip, subnet_id, owner);

        match self.api.get_subnet(&subnet_id.to_string()).await {
            Ok(subnet) => Ok(format!("{}/{}", ip, subnet.mask)),
            Err(e) => {
                // The address is useless without its mask; hand it back.
                if let Err(release_err) = self.delete_ip_address(&ip).await {
                    warn!("Failed to release {} after subnet lookup error: {}", ip, release_err);
                }
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl<A: PhpIpamApi> IpamClient for IpamAllocator<A> {
    async fn reserve_ip_address(&self, owner: &str, zone: &str) -> Result<String, IpamError> {
        let candidates = self.subnet_map.get(zone).filter(|ids| !ids.is_empty()).ok_or_else(|| {
            IpamError::Exhausted {
                zone: zone.to_string(),
                reason: "no subnets configured for zone".to_string(),
            }
        })?;

        let mut last_error = String::new();
        for subnet_id in candidates {
            match self.reserve_in_subnet(*subnet_id, owner).await {
                Ok(cidr) => {
                    info!("Reserved {} for {} in zone {}", cidr, owner, zone);
                    return Ok(cidr);
                }
                Err(e) => {
                    warn!("Unable to reserve IP in subnet {} for {}: {}", subnet_id, owner, e);
                    last_error = format!("subnet {}: {}", subnet_id, e);
                }
            }
        }

        Err(IpamError::Exhausted {
            zone: zone.to_string(),
            reason: last_error,
        })
    }

    async fn get_subnet_for_ip(&self, ip: &str) -> Result<SubnetInfo, IpamError> {
        let addresses = self.api.search_address(ip).await?;
        let address = addresses
            .first()
            .ok_or_else(|| IpamError::NotFound(format!("address {}", ip)))?;

        let subnet = self.api.get_subnet(&address.subnet_id).await?;
        let gateway = subnet
            .gateway
            .map(|g| g.ip_addr)
            .filter(|g| !g.is_empty())
            .ok_or_else(|| IpamError::NotFound(format!("gateway for subnet {}", subnet.id)))?;

        Ok(SubnetInfo {
            subnet: subnet.subnet,
            mask: subnet.mask,
            gateway,
        })
    }

    async fn delete_ip_address(&self, ip: &str) -> Result<(), IpamError> {
        let addresses = match self.api.search_address(ip).await {
            Ok(addresses) => addresses,
            Err(IpamError::NotFound(_)) => {
                debug!("Address {} not present in phpIPAM, nothing to release", ip);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let Some(address) = addresses.first() else {
            debug!("Address {} not present in phpIPAM, nothing to release", ip);
            return Ok(());
        };

        match self.api.delete_address(&address.id).await {
            Ok(()) | Err(IpamError::NotFound(_)) => {
                info!("Released {} (address ID {})", ip, address.id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockPhpIpam};

    fn allocator(mock: &MockPhpIpam, map: &[(&str, &[u64])]) -> IpamAllocator<MockPhpIpam> {
        let subnet_map = map
            .iter()
            .map(|(zone, ids)| ((*zone).to_string(), ids.to_vec()))
            .collect();
        IpamAllocator::new(mock.clone(), subnet_map)
    }

    #[tokio::test]
    async fn test_reserve_falls_through_to_next_subnet() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(7, "10.1.7.0/24", Some("10.1.7.1"), 0);
        mock.add_subnet(8, "10.1.8.0/24", Some("10.1.8.1"), 10);
        let ipam = allocator(&mock, &[("wdc04", &[7, 8])]);

        let cidr = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap();
        assert!(cidr.starts_with("10.1.8."), "got {}", cidr);
        assert!(cidr.ends_with("/24"));

        let reserve_calls: Vec<u64> = mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::ReserveFirstFree { subnet_id, .. } => Some(subnet_id),
                _ => None,
            })
            .collect();
        assert_eq!(reserve_calls, vec![7, 8]);
        assert_eq!(mock.reservations_owned_by("node-a").len(), 1);
    }

    #[tokio::test]
    async fn test_reserve_unknown_zone_is_exhausted() {
        let mock = MockPhpIpam::new();
        let ipam = allocator(&mock, &[("wdc04", &[7])]);

        let err = ipam.reserve_ip_address("node-a", "dal10").await.unwrap_err();
        assert!(matches!(err, IpamError::Exhausted { ref zone, .. } if zone == "dal10"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reserve_all_subnets_full() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(7, "10.1.7.0/24", None, 0);
        mock.add_subnet(8, "10.1.8.0/24", None, 0);
        let ipam = allocator(&mock, &[("wdc04", &[7, 8])]);

        let err = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap_err();
        assert!(matches!(err, IpamError::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_reserve_releases_address_when_mask_lookup_fails() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(7, "10.1.7.0/24", Some("10.1.7.1"), 10);
        mock.add_subnet(8, "10.1.8.0/24", Some("10.1.8.1"), 10);
        mock.fail_subnet_lookup(7);
        let ipam = allocator(&mock, &[("wdc04", &[7, 8])]);

        let cidr = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap();
        assert!(cidr.starts_with("10.1.8."));

        let owned = mock.reservations_owned_by("node-a");
        assert_eq!(owned.len(), 1, "no address may leak: {:?}", owned);
    }

    #[tokio::test]
    async fn test_get_subnet_for_ip() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(8, "10.1.8.0/24", Some("10.1.8.1"), 10);
        let ipam = allocator(&mock, &[("wdc04", &[8])]);

        let cidr = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap();
        let ip = cidr.split('/').next().unwrap();

        let info = ipam.get_subnet_for_ip(ip).await.unwrap();
        assert_eq!(
            info,
            SubnetInfo {
                subnet: "10.1.8.0".to_string(),
                mask: "24".to_string(),
                gateway: "10.1.8.1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_get_subnet_for_ip_without_gateway() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(8, "10.1.8.0/24", None, 10);
        let ipam = allocator(&mock, &[("wdc04", &[8])]);

        let cidr = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap();
        let ip = cidr.split('/').next().unwrap();

        assert!(matches!(ipam.get_subnet_for_ip(ip).await, Err(IpamError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(8, "10.1.8.0/24", Some("10.1.8.1"), 10);
        let ipam = allocator(&mock, &[("wdc04", &[8])]);

        let cidr = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap();
        let ip = cidr.split('/').next().unwrap();

        ipam.delete_ip_address(ip).await.unwrap();
        assert!(mock.reservations_owned_by("node-a").is_empty());

        ipam.delete_ip_address(ip).await.unwrap();
        ipam.delete_ip_address("10.9.9.9").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_propagates_api_failure() {
        let mock = MockPhpIpam::new();
        mock.add_subnet(8, "10.1.8.0/24", Some("10.1.8.1"), 10);
        let ipam = allocator(&mock, &[("wdc04", &[8])]);

        let cidr = ipam.reserve_ip_address("node-a", "wdc04").await.unwrap();
        let ip = cidr.split('/').next().unwrap();

        mock.fail_deletes(true);
        assert!(matches!(ipam.delete_ip_address(ip).await, Err(IpamError::Api { .. })));
        assert_eq!(mock.reservations_owned_by("node-a").len(), 1);
    }
}
