use super::{Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::model::{HostInterface, Subnet};
use crate::net::interface::host_interfaces;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Routing/topology collector
///
/// Parses the routing table into directly attached IPv4 subnets and stores
/// them on a side channel. Produces no entities of its own.
pub struct TopologyCollector {
    routing_timeout: Duration,
    subnets: Arc<Mutex<Vec<Subnet>>>,
}

impl TopologyCollector {
    pub fn new(timeouts: &CommandTimeouts) -> Self {
        Self {
            routing_timeout: timeouts.routing_table,
            subnets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Latest subnet list, published after every topology scan.
    pub fn subnets(&self) -> Vec<Subnet> {
        self.subnets.lock().unwrap().clone()
    }

    async fn scan_inner(&self) -> CollectorResult {
        let stdout = match cmd::run_complete("netstat", &["-rn"], self.routing_timeout).await {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::warn!(collector = "topology", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let interfaces = match host_interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::warn!(collector = "topology", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let subnets = parse_routing_table(&stdout, &interfaces);
        *self.subnets.lock().unwrap() = subnets;
        CollectorResult::default()
    }
}

#[async_trait]
impl Collector for TopologyCollector {
    fn name(&self) -> &'static str {
        "topology"
    }

    async fn scan(&self) -> CollectorResult {
        self.scan_inner().await
    }
}

/// Parse `netstat -rn` into attached subnets. Default routes, loopback,
/// IPv6, link-local, multicast, broadcast, and host routes are skipped;
/// rows whose interface has no local IPv4 are dropped. First CIDR wins.
pub fn parse_routing_table(stdout: &str, interfaces: &[HostInterface]) -> Vec<Subnet> {
    let mut seen = HashSet::new();
    let mut subnets = Vec::new();

    for line in stdout.lines() {
        if line.starts_with("Internet6:") {
            break;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            continue;
        }
        let destination = tokens[0];
        let gateway_col = tokens[1];
        let netif = tokens[3];

        if destination == "default"
            || destination == "Destination"
            || destination.contains(':')
            || destination.starts_with("127")
            || destination.starts_with("169.254")
            || destination.starts_with("224")
            || destination.starts_with("255")
            || destination.ends_with("/32")
        {
            continue;
        }

        let Some((network, prefix_len)) = parse_destination(destination) else {
            continue;
        };
        // Four plain octets are a host route even without the /32 suffix.
        if prefix_len == 32 {
            continue;
        }

        let Some(local_ip) = interfaces
            .iter()
            .find(|iface| iface.name == netif)
            .map(|iface| iface.ipv4.clone())
        else {
            continue;
        };

        // link#N gateways mean directly attached.
        let gateway = Ipv4Addr::from_str(gateway_col)
            .ok()
            .map(|gw| gw.to_string());

        let cidr = format!("{}/{}", network, prefix_len);
        if !seen.insert(cidr.clone()) {
            continue;
        }
        subnets.push(Subnet {
            cidr,
            network: network.to_string(),
            prefix_len,
            gateway,
            interface: netif.to_string(),
            local_ip,
        });
    }
    subnets
}

/// Expand a routing-table destination into `(network, prefix)`. Partial
/// destinations infer the prefix from the octet count: `192.168.1` → /24,
/// `172.20` → /16, `10` → /8.
pub fn parse_destination(destination: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr_part, explicit_prefix) = match destination.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix.parse::<u8>().ok()?)),
        None => (destination, None),
    };

    let octets: Vec<&str> = addr_part.split('.').collect();
    if octets.is_empty() || octets.len() > 4 || !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return None;
    }

    let prefix = explicit_prefix.unwrap_or(match octets.len() {
        1 => 8,
        2 => 16,
        3 => 24,
        _ => 32,
    });
    if prefix > 32 {
        return None;
    }

    let mut full = [0u8; 4];
    for (i, octet) in octets.iter().enumerate() {
        full[i] = octet.parse().ok()?;
    }
    Some((Ipv4Addr::from(full), prefix))
}
