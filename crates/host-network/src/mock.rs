//! Fake iproute2 for unit testing
//!
//! Simulates links, addresses and routes in memory, answers `ip` commands
//! with realistic output and records every command it receives.

use crate::error::NetworkError;
use crate::runner::{CommandOutput, CommandRunner};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct FakeLink {
    index: u32,
    parent: Option<String>,
    up: bool,
    carrier: bool,
    addresses: Vec<String>,
}

#[derive(Debug, Clone)]
struct FakeRoute {
    via: String,
    dev: String,
}

#[derive(Debug)]
struct FakeState {
    links: BTreeMap<String, FakeLink>,
    routes: BTreeMap<String, FakeRoute>,
    default_gateway: String,
    default_device: String,
    failing: Vec<String>,
    commands: Vec<String>,
    next_index: u32,
}

/// In-memory iproute2
#[derive(Debug, Clone)]
pub struct FakeIpRoute2 {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeIpRoute2 {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIpRoute2 {
    /// Host with an `eth0` uplink whose gateway is `10.130.0.1`
    pub fn new() -> Self {
        let mut links = BTreeMap::new();
        links.insert(
            "eth0".to_string(),
            FakeLink {
                index: 2,
                parent: None,
                up: true,
                carrier: true,
                addresses: vec!["10.130.0.5/26".to_string()],
            },
        );
        Self {
            state: Arc::new(Mutex::new(FakeState {
                links,
                routes: BTreeMap::new(),
                default_gateway: "10.130.0.1".to_string(),
                default_device: "eth0".to_string(),
                failing: Vec::new(),
                commands: Vec::new(),
                next_index: 3,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Changes the gateway answered for the private range.
    pub fn set_fallback_gateway(&self, gateway: &str) {
        self.lock().default_gateway = gateway.to_string();
    }

    /// Pre-creates a link in the given admin state.
    pub fn add_link(&self, name: &str, parent: Option<&str>, up: bool) {
        let mut state = self.lock();
        let index = state.next_index;
        state.next_index += 1;
        state.links.insert(
            name.to_string(),
            FakeLink {
                index,
                parent: parent.map(str::to_string),
                up,
                carrier: true,
                addresses: Vec::new(),
            },
        );
    }

    /// Marks a link as having lost its carrier (the parent went away).
    pub fn drop_carrier(&self, name: &str) {
        if let Some(link) = self.lock().links.get_mut(name) {
            link.carrier = false;
        }
    }

    /// Pre-assigns an address to an existing link.
    pub fn add_address(&self, device: &str, cidr: &str) {
        if let Some(link) = self.lock().links.get_mut(device) {
            link.addresses.push(cidr.to_string());
        }
    }

    /// Pre-installs a route.
    pub fn add_route(&self, subnet: &str, via: &str) {
        let mut state = self.lock();
        let dev = state.default_device.clone();
        state.routes.insert(
            subnet.to_string(),
            FakeRoute {
                via: via.to_string(),
                dev,
            },
        );
    }

    /// Makes every command starting with `prefix` (e.g. `"route add"`) fail.
    pub fn fail_on(&self, prefix: &str) {
        self.lock().failing.push(prefix.to_string());
    }

    /// Whether `name` exists and is up, `None` if it does not exist.
    pub fn link_up(&self, name: &str) -> Option<bool> {
        self.lock().links.get(name).map(|l| l.up)
    }

    /// Addresses assigned to `device`.
    pub fn addresses(&self, device: &str) -> Vec<String> {
        self.lock()
            .links
            .get(device)
            .map(|l| l.addresses.clone())
            .unwrap_or_default()
    }

    /// Gateway of the route for `subnet`, if installed.
    pub fn route(&self, subnet: &str) -> Option<String> {
        self.lock().routes.get(subnet).map(|r| r.via.clone())
    }

    /// Every command received, without the leading `ip`.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Number of commands starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.lock().commands.iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Number of commands that changed state.
    pub fn mutations(&self) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| {
                let mut words = c.split_whitespace().skip(1);
                matches!(words.next(), Some("add" | "del" | "set"))
            })
            .count()
    }
}

fn missing_device(name: &str) -> CommandOutput {
    CommandOutput::failed(1, format!("Device \"{}\" does not exist.\n", name))
}

fn render_link(name: &str, link: &FakeLink) -> String {
    let display = match &link.parent {
        Some(parent) => format!("{}@{}", name, parent),
        None => name.to_string(),
    };
    let (flags, qdisc, state) = match (link.up, link.carrier) {
        (true, true) => ("BROADCAST,MULTICAST,UP,LOWER_UP", "noqueue", "UP"),
        (true, false) => ("NO-CARRIER,BROADCAST,MULTICAST,UP", "noqueue", "DOWN"),
        (false, _) => ("BROADCAST,MULTICAST", "noop", "DOWN"),
    };
    format!(
        "{}: {}: <{}> mtu 1500 qdisc {} state {} mode DEFAULT group default qlen 1000\n    link/ether 02:00:0a:00:00:{:02x} brd ff:ff:ff:ff:ff:ff\n",
        link.index, display, flags, qdisc, state, link.index
    )
}

impl FakeState {
    fn execute(&mut self, args: &[&str]) -> CommandOutput {
        match args {
            ["link", "show", name] => match self.links.get(*name) {
                Some(link) => CommandOutput::ok(render_link(name, link)),
                None => missing_device(name),
            },
            ["link", "add", name, "link", parent, "type", "macvlan"] => {
                if !self.links.contains_key(*parent) {
                    return CommandOutput::failed(1, format!("Cannot find device \"{}\"\n", parent));
                }
                if self.links.contains_key(*name) {
                    return CommandOutput::failed(2, "RTNETLINK answers: File exists\n");
                }
                let index = self.next_index;
                self.next_index += 1;
                self.links.insert(
                    (*name).to_string(),
                    FakeLink {
                        index,
                        parent: Some((*parent).to_string()),
                        up: false,
                        carrier: true,
                        addresses: Vec::new(),
                    },
                );
                CommandOutput::ok("")
            }
            ["link", "set", name, "up"] => match self.links.get_mut(*name) {
                Some(link) => {
                    link.up = true;
                    CommandOutput::ok("")
                }
                None => CommandOutput::failed(1, format!("Cannot find device \"{}\"\n", name)),
            },
            ["link", "del", name] => match self.links.remove(*name) {
                Some(_) => CommandOutput::ok(""),
                None => CommandOutput::failed(1, format!("Cannot find device \"{}\"\n", name)),
            },
            ["addr", "show", name] => match self.links.get(*name) {
                Some(link) => {
                    let mut out = render_link(name, link);
                    for cidr in &link.addresses {
                        out.push_str(&format!(
                            "    inet {} scope global {}\n       valid_lft forever preferred_lft forever\n",
                            cidr, name
                        ));
                    }
                    CommandOutput::ok(out)
                }
                None => missing_device(name),
            },
            ["addr", "add", cidr, "dev", name] => match self.links.get_mut(*name) {
                Some(link) if link.addresses.iter().any(|a| a == cidr) => {
                    CommandOutput::failed(2, "RTNETLINK answers: File exists\n")
                }
                Some(link) => {
                    link.addresses.push((*cidr).to_string());
                    CommandOutput::ok("")
                }
                None => CommandOutput::failed(1, format!("Cannot find device \"{}\"\n", name)),
            },
            ["addr", "del", cidr, "dev", name] => match self.links.get_mut(*name) {
                Some(link) if link.addresses.iter().any(|a| a == cidr) => {
                    link.addresses.retain(|a| a != cidr);
                    CommandOutput::ok("")
                }
                Some(_) => CommandOutput::failed(2, "RTNETLINK answers: Cannot assign requested address\n"),
                None => CommandOutput::failed(1, format!("Cannot find device \"{}\"\n", name)),
            },
            ["route", "show", subnet] => match self.routes.get(*subnet) {
                Some(route) => CommandOutput::ok(format!("{} via {} dev {} \n", subnet, route.via, route.dev)),
                None => CommandOutput::ok(""),
            },
            ["route", "add", subnet, "via", via] => {
                if self.routes.contains_key(*subnet) {
                    return CommandOutput::failed(2, "RTNETLINK answers: File exists\n");
                }
                let dev = self.default_device.clone();
                self.routes.insert(
                    (*subnet).to_string(),
                    FakeRoute {
                        via: (*via).to_string(),
                        dev,
                    },
                );
                CommandOutput::ok("")
            }
            ["route", "del", subnet, rest @ ..] => {
                let matches = match (self.routes.get(*subnet), rest) {
                    (Some(_), []) => true,
                    (Some(route), ["via", via]) => route.via == *via,
                    _ => false,
                };
                if matches {
                    self.routes.remove(*subnet);
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed(2, "RTNETLINK answers: No such process\n")
                }
            }
            ["route", "get", target] => {
                let addr = target.split('/').next().unwrap_or(*target);
                let (via, dev) = match self.routes.get(*target) {
                    Some(route) => (route.via.clone(), route.dev.clone()),
                    None => (self.default_gateway.clone(), self.default_device.clone()),
                };
                CommandOutput::ok(format!(
                    "{} via {} dev {} src 10.130.0.5 uid 0 \n    cache \n",
                    addr, via, dev
                ))
            }
            _ => CommandOutput::failed(255, format!("Command \"{}\" is unknown, try \"ip help\".\n", args.join(" "))),
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for FakeIpRoute2 {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, NetworkError> {
        let mut state = self.lock();
        let line = args.join(" ");
        state.commands.push(line.clone());

        if state.failing.iter().any(|prefix| line.starts_with(prefix.as_str())) {
            return Ok(CommandOutput::failed(2, "RTNETLINK answers: Operation not permitted\n"));
        }
        Ok(state.execute(args))
    }
}
