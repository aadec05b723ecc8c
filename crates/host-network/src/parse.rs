//! `ip` output parsing
//!
//! The only place that knows what iproute2 prints. Everything above this
//! module works with [`LinkInfo`], [`AddressInfo`] and [`RouteInfo`].

use regex::Regex;
use std::sync::LazyLock;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\d+:\s+([^:@\s]+)(?:@(\S+))?:\s+<([^>]*)>.*?\bstate\s+(\S+)").expect("valid link regex")
});
static INET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*inet\s+(\S+)").expect("valid inet regex"));
static VIA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bvia\s+(\S+)").expect("valid via regex"));
static DEV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bdev\s+(\S+)").expect("valid dev regex"));

/// Route keywords that can appear where a destination would otherwise be
const ROUTE_KEYWORDS: &[&str] = &["via", "dev", "proto", "scope", "src", "metric", "table", "nexthop"];

/// A network link as shown by `ip link show <name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Link name
    pub name: String,
    /// Parent link for stacked devices (`overlay0@eth0`)
    pub parent: Option<String>,
    /// Interface flags (`BROADCAST`, `UP`, ...)
    pub flags: Vec<String>,
    /// Operational state (`UP`, `DOWN`, `UNKNOWN`, ...)
    pub state: String,
}

impl LinkInfo {
    /// Whether the link is administratively down and must be brought up.
    ///
    /// Only the `UP` flag counts: an admin-up link without carrier also
    /// reports `state DOWN`.
    pub fn is_down(&self) -> bool {
        !self.flags.iter().any(|f| f == "UP")
    }
}

/// An IPv4 address assigned to a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// Address with prefix length (`10.1.8.10/24`)
    pub cidr: String,
}

/// A routing table entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteInfo {
    /// Destination prefix, absent for `ip route get` style output without one
    pub destination: Option<String>,
    /// Next hop
    pub gateway: Option<String>,
    /// Egress device
    pub device: Option<String>,
}

/// Parses `ip link show <name>`.
pub fn parse_link(output: &str) -> Option<LinkInfo> {
    let caps = LINK_RE.captures(output)?;
    Some(LinkInfo {
        name: caps[1].to_string(),
        parent: caps.get(2).map(|m| m.as_str().to_string()),
        flags: caps[3].split(',').filter(|f| !f.is_empty()).map(str::to_string).collect(),
        state: caps[4].to_string(),
    })
}

/// Parses the IPv4 addresses out of `ip addr show <device>`.
pub fn parse_addresses(output: &str) -> Vec<AddressInfo> {
    INET_RE
        .captures_iter(output)
        .map(|caps| AddressInfo {
            cidr: caps[1].to_string(),
        })
        .collect()
}

/// Parses one route line.
pub fn parse_route_line(line: &str) -> Option<RouteInfo> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let destination = line
        .split_whitespace()
        .next()
        .filter(|first| !ROUTE_KEYWORDS.contains(first))
        .map(str::to_string);

    Some(RouteInfo {
        destination,
        gateway: VIA_RE.captures(line).map(|c| c[1].to_string()),
        device: DEV_RE.captures(line).map(|c| c[1].to_string()),
    })
}

/// Parses `ip route show <prefix>`. Indented continuation lines are skipped.
pub fn parse_routes(output: &str) -> Vec<RouteInfo> {
    output
        .lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .filter_map(parse_route_line)
        .collect()
}

/// Parses `ip route get <target>`; only the first line carries the route.
pub fn parse_route_get(output: &str) -> Option<RouteInfo> {
    output.lines().find_map(parse_route_line)
}
