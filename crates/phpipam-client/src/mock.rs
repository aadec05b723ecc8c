//! Mock phpIPAM API for unit testing
//!
//! Keeps subnets and address reservations in memory so allocation logic can
//! be exercised without a phpIPAM instance. Every call is recorded and can be
//! inspected with [`MockPhpIpam::calls`].

use crate::error::IpamError;
use crate::ipam_trait::PhpIpamApi;
use crate::models::{Address, Subnet, SubnetGateway};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Recorded call against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `reserve_first_free`
    ReserveFirstFree {
        /// Subnet asked for an address
        subnet_id: u64,
        /// Owner tag
        owner: String,
    },
    /// `get_subnet`
    GetSubnet(String),
    /// `search_address`
    SearchAddress(String),
    /// `delete_address`
    DeleteAddress(String),
}

#[derive(Debug)]
struct MockSubnet {
    network: String,
    mask: String,
    gateway: Option<String>,
    free: usize,
    handed_out: usize,
}

#[derive(Debug, Default)]
struct MockState {
    subnets: BTreeMap<u64, MockSubnet>,
    addresses: BTreeMap<String, Address>,
    failing_lookups: HashSet<String>,
    fail_deletes: bool,
    calls: Vec<MockCall>,
    next_id: u64,
}

/// In-memory phpIPAM
#[derive(Debug, Clone, Default)]
pub struct MockPhpIpam {
    state: Arc<Mutex<MockState>>,
}

impl MockPhpIpam {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Adds a subnet in CIDR form with `free` reservable addresses.
    pub fn add_subnet(&self, id: u64, cidr: &str, gateway: Option<&str>, free: usize) {
        let (network, mask) = cidr.split_once('/').unwrap_or((cidr, "32"));
        self.lock().subnets.insert(
            id,
            MockSubnet {
                network: network.to_string(),
                mask: mask.to_string(),
                gateway: gateway.map(str::to_string),
                free,
                handed_out: 0,
            },
        );
    }

    /// Marks a subnet as full.
    pub fn exhaust_subnet(&self, id: u64) {
        if let Some(subnet) = self.lock().subnets.get_mut(&id) {
            subnet.free = 0;
        }
    }

    /// Makes `get_subnet` fail for the given subnet ID.
    pub fn fail_subnet_lookup(&self, id: u64) {
        self.lock().failing_lookups.insert(id.to_string());
    }

    /// Makes every `delete_address` call fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Addresses currently reserved for `owner`.
    pub fn reservations_owned_by(&self, owner: &str) -> Vec<String> {
        self.lock()
            .addresses
            .values()
            .filter(|a| a.owner.as_deref() == Some(owner))
            .filter_map(|a| a.ip.clone())
            .collect()
    }

    /// All reserved addresses.
    pub fn reservations(&self) -> Vec<String> {
        self.lock().addresses.values().filter_map(|a| a.ip.clone()).collect()
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }
}

#[async_trait::async_trait]
impl PhpIpamApi for MockPhpIpam {
    async fn reserve_first_free(&self, subnet_id: u64, owner: &str) -> Result<String, IpamError> {
        let mut state = self.lock();
        state.calls.push(MockCall::ReserveFirstFree {
            subnet_id,
            owner: owner.to_string(),
        });

        let subnet = state.subnets.get_mut(&subnet_id).ok_or_else(|| IpamError::Api {
            code: 404,
            message: format!("Subnet {} does not exist", subnet_id),
        })?;
        if subnet.free == 0 {
            return Err(IpamError::Api {
                code: 409,
                message: "No free addresses found".to_string(),
            });
        }
        subnet.free -= 1;
        subnet.handed_out += 1;

        let prefix = subnet.network.rsplit_once('.').map_or("10.0.0", |(p, _)| p);
        let ip = format!("{}.{}", prefix, 9 + subnet.handed_out);

        state.next_id += 1;
        let id = state.next_id.to_string();
        state.addresses.insert(
            id.clone(),
            Address {
                id,
                subnet_id: subnet_id.to_string(),
                ip: Some(ip.clone()),
                owner: Some(owner.to_string()),
            },
        );
        Ok(ip)
    }

    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, IpamError> {
        let mut state = self.lock();
        state.calls.push(MockCall::GetSubnet(subnet_id.to_string()));

        if state.failing_lookups.contains(subnet_id) {
            return Err(IpamError::Api {
                code: 500,
                message: "subnet lookup failed".to_string(),
            });
        }
        let subnet = subnet_id
            .parse::<u64>()
            .ok()
            .and_then(|id| state.subnets.get(&id))
            .ok_or_else(|| IpamError::NotFound(format!("subnet {}", subnet_id)))?;

        Ok(Subnet {
            id: subnet_id.to_string(),
            subnet: subnet.network.clone(),
            mask: subnet.mask.clone(),
            gateway: subnet.gateway.clone().map(|ip_addr| SubnetGateway { ip_addr }),
        })
    }

    async fn search_address(&self, ip: &str) -> Result<Vec<Address>, IpamError> {
        let mut state = self.lock();
        state.calls.push(MockCall::SearchAddress(ip.to_string()));

        let found: Vec<Address> = state
            .addresses
            .values()
            .filter(|a| a.ip.as_deref() == Some(ip))
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(IpamError::NotFound("Address not found".to_string()));
        }
        Ok(found)
    }

    async fn delete_address(&self, address_id: &str) -> Result<(), IpamError> {
        let mut state = self.lock();
        state.calls.push(MockCall::DeleteAddress(address_id.to_string()));

        if state.fail_deletes {
            return Err(IpamError::Api {
                code: 500,
                message: "delete failed".to_string(),
            });
        }
        state
            .addresses
            .remove(address_id)
            .map(|_| ())
            .ok_or_else(|| IpamError::NotFound(format!("address {}", address_id)))
    }
}
