use super::{Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::constants::{COMMON_SERVICE_TYPES, HOST_ID};
use crate::model::{Entity, Relation, RelationKind, SignalKind};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const META_BROWSE_TYPE: &str = "_services._dns-sd._udp.local.";

type RecvResult = (
    flume::Receiver<ServiceEvent>,
    Result<ServiceEvent, flume::RecvError>,
);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// Each future owns a clone of its receiver; the flume receivers mdns-sd
/// hands out are multi-consumer clones.
fn make_recv_future(rx: flume::Receiver<ServiceEvent>) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (rx, result)
    })
}

/// Event-driven mDNS/DNS-SD collector
///
/// Browses a fixed set of common service types plus whatever the one-shot
/// dynamic discovery pass surfaces, and accumulates every resolved service.
/// `scan` never drives new work; it returns the accumulation.
pub struct MdnsCollector {
    accumulated: Arc<Mutex<BTreeMap<String, (Entity, Relation)>>>,
    dynamic_timeout: Duration,
}

impl MdnsCollector {
    pub fn new(timeouts: &CommandTimeouts) -> Self {
        Self {
            accumulated: Arc::new(Mutex::new(BTreeMap::new())),
            dynamic_timeout: timeouts.dynamic_mdns,
        }
    }

    /// Start browsing. Every resolution updates the accumulation and pushes
    /// the full union through `update_tx`.
    pub fn start(&self, update_tx: mpsc::Sender<CollectorResult>, cancel: CancellationToken) {
        let accumulated = Arc::clone(&self.accumulated);
        let dynamic_timeout = self.dynamic_timeout;

        tokio::spawn(async move {
            let daemon = match ServiceDaemon::new() {
                Ok(daemon) => daemon,
                Err(e) => {
                    tracing::warn!(collector = "mdns", "daemon construction failed: {}", e);
                    return;
                }
            };

            let mut browsed: HashSet<String> = HashSet::new();
            let mut receivers = Vec::new();
            for service_type in COMMON_SERVICE_TYPES {
                // A browser that fails to construct is skipped, never fatal.
                if let Ok(rx) = daemon.browse(service_type) {
                    browsed.insert((*service_type).to_string());
                    receivers.push(rx);
                }
            }

            for service_type in discover_dynamic_types(dynamic_timeout).await {
                if browsed.contains(&service_type) || service_type == META_BROWSE_TYPE {
                    continue;
                }
                if let Ok(rx) = daemon.browse(&service_type) {
                    browsed.insert(service_type);
                    receivers.push(rx);
                }
            }

            let mut pending: FuturesUnordered<RecvFuture> = FuturesUnordered::new();
            for rx in receivers {
                pending.push(make_recv_future(rx));
            }

            loop {
                tokio::select! {
                    Some((rx, result)) = pending.next() => {
                        match result {
                            Ok(ServiceEvent::ServiceResolved(info)) => {
                                if let Some((entity, relation)) = synthesize(&info) {
                                    let snapshot = {
                                        let mut acc = accumulated.lock().unwrap();
                                        acc.insert(entity.id.clone(), (entity, relation));
                                        union_of(&acc)
                                    };
                                    if update_tx.send(snapshot).await.is_err() {
                                        break;
                                    }
                                }
                                pending.push(make_recv_future(rx));
                            }
                            Ok(_) => pending.push(make_recv_future(rx)),
                            Err(_) => {}
                        }
                    }
                    _ = cancel.cancelled() => break,
                    else => break,
                }
            }

            let _ = daemon.shutdown();
        });
    }
}

#[async_trait]
impl Collector for MdnsCollector {
    fn name(&self) -> &'static str {
        "mdns"
    }

    async fn scan(&self) -> CollectorResult {
        let acc = self.accumulated.lock().unwrap();
        union_of(&acc)
    }
}

fn union_of(acc: &BTreeMap<String, (Entity, Relation)>) -> CollectorResult {
    CollectorResult {
        entities: acc.values().map(|(e, _)| e.clone()).collect(),
        relations: acc.values().map(|(_, r)| r.clone()).collect(),
    }
}

/// `_airplay._tcp.local.` → `_airplay._tcp`
pub fn format_service_type(full: &str) -> String {
    full.trim_end_matches('.')
        .trim_end_matches(".local")
        .trim_end_matches('.')
        .to_string()
}

/// Build the entity and its `hosts_service` relation from a resolution.
pub fn synthesize(info: &ServiceInfo) -> Option<(Entity, Relation)> {
    let service_type = format_service_type(info.get_type());
    let instance = info
        .get_fullname()
        .strip_suffix(info.get_type())
        .map(|name| name.trim_end_matches('.'))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| info.get_hostname().trim_end_matches('.'));
    let display = instance.to_string();

    let id = format!(
        "bonjour-{}-{}",
        service_type,
        display.replace(' ', "-")
    );
    let ip = info
        .get_addresses()
        .iter()
        .next()
        .map(|addr| addr.to_string());

    let mut entity = Entity::observed(
        id.clone(),
        SignalKind::Mdns {
            service_type,
            port: Some(info.get_port()),
            host: Some(info.get_hostname().to_string()),
        },
        display,
    );
    entity.ip = ip;

    let relation = Relation::link(id, HOST_ID, RelationKind::HostsService);
    Some((entity, relation))
}

/// One-shot dynamic service-type discovery. The browse command never exits
/// on its own; it is killed at the deadline and its partial stdout parsed.
async fn discover_dynamic_types(deadline: Duration) -> Vec<String> {
    match cmd::run_with_deadline("dns-sd", &["-B", META_BROWSE_TYPE], deadline).await {
        Ok(out) => parse_dynamic_types(&out.stdout),
        Err(e) => {
            tracing::debug!(collector = "mdns", "dynamic discovery unavailable: {}", e.concise());
            Vec::new()
        }
    }
}

/// Parse `dns-sd -B _services._dns-sd._udp.local.` output lines of the shape
/// `14:15:04.810  Add  3  6 local.  _tcp.local.  _airplay` into full browse
/// types (`_airplay._tcp.local.`). Truncated trailing lines are dropped.
pub fn parse_dynamic_types(stdout: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut types = Vec::new();
    for line in stdout.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 7 || tokens[1] != "Add" {
            continue;
        }
        let proto = tokens[5]
            .trim_end_matches('.')
            .trim_end_matches("local")
            .trim_end_matches('.');
        let instance = tokens[6];
        if !instance.starts_with('_') || proto.is_empty() {
            continue;
        }
        let full = format!("{}.{}.local.", instance, proto);
        if seen.insert(full.clone()) {
            types.push(full);
        }
    }
    types
}
