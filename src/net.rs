use crate::cmd;
use crate::constants::PRIMARY_WIFI_INTERFACE;
use crate::errors::DiscoveryError;
use crate::model::{HostInterface, Subnet};
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

/// Network interface enumeration and subnet arithmetic.
pub mod interface {
    use super::*;

    /// Enumerate the host's non-loopback IPv4 interfaces.
    pub fn host_interfaces() -> Result<Vec<HostInterface>, DiscoveryError> {
        let mut result = Vec::new();
        for iface in NetworkInterface::show()? {
            for addr in &iface.addr {
                if let IpAddr::V4(ipv4) = addr.ip() {
                    if !ipv4.is_loopback() && !ipv4.is_unspecified() {
                        result.push(HostInterface {
                            name: iface.name.clone(),
                            ipv4: ipv4.to_string(),
                            mac: iface.mac_addr.clone().filter(|m| !m.is_empty()),
                        });
                    }
                }
            }
        }
        Ok(result)
    }

    /// Names of the enumerable capture candidates.
    pub fn interface_names() -> Vec<String> {
        let mut names: Vec<String> = host_interfaces()
            .unwrap_or_default()
            .into_iter()
            .map(|i| i.name)
            .collect();
        names.dedup();
        names
    }

    /// Resolve the interface carrying the default route, falling back to the
    /// primary Wi-Fi interface when the routing lookup yields nothing.
    pub async fn default_interface() -> String {
        let looked_up = cmd::run_complete("route", &["get", "default"], Duration::from_secs(5))
            .await
            .ok()
            .and_then(|stdout| {
                stdout.lines().find_map(|line| {
                    let line = line.trim();
                    line.strip_prefix("interface:")
                        .map(|rest| rest.trim().to_string())
                })
            })
            .filter(|name| !name.is_empty());
        looked_up.unwrap_or_else(|| PRIMARY_WIFI_INTERFACE.to_string())
    }

    /// Check whether an IPv4 address falls inside `network/prefix`.
    pub fn ip_in_subnet(ip: Ipv4Addr, network: Ipv4Addr, prefix_len: u8) -> bool {
        if prefix_len > 32 {
            return false;
        }
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len)
        };
        (u32::from(ip) & mask) == (u32::from(network) & mask)
    }

    /// First subnet in the list containing `ip`, if any. Pure function; the
    /// consumer drives grouping with it.
    pub fn match_subnet<'a>(ip: &str, subnets: &'a [Subnet]) -> Option<&'a Subnet> {
        let ip = Ipv4Addr::from_str(ip).ok()?;
        subnets.iter().find(|s| {
            Ipv4Addr::from_str(&s.network)
                .map(|network| ip_in_subnet(ip, network, s.prefix_len))
                .unwrap_or(false)
        })
    }
}
