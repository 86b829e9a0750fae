use super::{Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::constants::HOST_ID;
use crate::db::vendor::{normalize_mac, MacVendorDatabase};
use crate::model::{Entity, Relation, RelationKind, SignalKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const BROADCAST_MAC: &str = "ff:ff:ff:ff:ff:ff";

/// Link-layer neighbor collector
///
/// Primes the OS neighbor cache with one best-effort multicast probe, then
/// reads the ARP table and reports each resolved LAN neighbor.
pub struct NeighborCollector {
    vendor_db: Arc<Mutex<MacVendorDatabase>>,
    table_timeout: Duration,
}

impl NeighborCollector {
    pub fn new(vendor_db: Arc<Mutex<MacVendorDatabase>>, timeouts: &CommandTimeouts) -> Self {
        Self {
            vendor_db,
            table_timeout: timeouts.neighbor_table,
        }
    }

    async fn scan_inner(&self) -> CollectorResult {
        // Warm the neighbor cache; failure is irrelevant.
        let _ = cmd::run_with_deadline(
            "ping",
            &["-c", "1", "-W", "1", "224.0.0.1"],
            Duration::from_secs(2),
        )
        .await;

        let stdout = match cmd::run_complete("arp", &["-an"], self.table_timeout).await {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::warn!(collector = "neighbors", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let mut result = CollectorResult::default();
        let mut db = self.vendor_db.lock().await;

        for line in stdout.lines() {
            let Some(neighbor) = parse_neighbor_line(line) else {
                continue;
            };
            let vendor = db.lookup_vendor(&neighbor.mac);
            let name = match &vendor {
                Some(v) => format!("{} ({})", v, neighbor.ip),
                None => neighbor.ip.clone(),
            };
            let id = format!("lan-{}", neighbor.mac);
            let entity = Entity::observed(
                id.clone(),
                SignalKind::Lan {
                    interface: neighbor.interface.clone(),
                    is_gateway: neighbor.is_gateway,
                    vendor,
                    device_type: None,
                    product_name: None,
                    icon_key: None,
                },
                name,
            )
            .with_mac(neighbor.mac.clone())
            .with_ip(neighbor.ip.clone());

            let kind = if neighbor.is_gateway {
                RelationKind::Gateway
            } else {
                RelationKind::ConnectedTo
            };
            result.relations.push(Relation::link(id, HOST_ID, kind));
            result.entities.push(entity);
        }

        result
    }
}

#[async_trait]
impl Collector for NeighborCollector {
    fn name(&self) -> &'static str {
        "neighbors"
    }

    async fn scan(&self) -> CollectorResult {
        self.scan_inner().await
    }
}

#[derive(Debug, PartialEq)]
pub struct NeighborEntry {
    pub ip: String,
    pub mac: String,
    pub interface: String,
    pub is_gateway: bool,
}

/// Parse one `arp -an` line of the shape
/// `? (192.168.1.42) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]`.
/// Incomplete and broadcast entries are skipped.
pub fn parse_neighbor_line(line: &str) -> Option<NeighborEntry> {
    if line.contains("(incomplete)") {
        return None;
    }
    let open = line.find('(')?;
    let close = line[open..].find(')')? + open;
    let ip = line[open + 1..close].to_string();

    let after = &line[close + 1..];
    let mut words = after.split_whitespace();
    if words.next()? != "at" {
        return None;
    }
    let mac = normalize_mac(words.next()?)?;
    if mac == BROADCAST_MAC {
        return None;
    }
    if words.next()? != "on" {
        return None;
    }
    let interface = words.next()?.to_string();

    // The interface-scope flag plus a .1 suffix is a heuristic; gateways on
    // other last octets are reported as plain neighbors.
    let is_gateway = after.contains("ifscope") && ip.ends_with(".1");

    Some(NeighborEntry {
        ip,
        mac,
        interface,
        is_gateway,
    })
}
