use crate::constants::HOST_ID;
use crate::model::{Entity, PacketEvent};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Rolling window of TTL samples kept per IP for OS inference.
const TTL_WINDOW: usize = 100;

/// IP → entity-id map used to attribute packets, rebuilt on demand from the
/// store. Host addresses all map to the Host sentinel and are additionally
/// tracked as a set so aggregation can exclude self-traffic.
#[derive(Debug, Default)]
pub struct CorrelationIndex {
    ip_to_entity: HashMap<String, String>,
    host_ips: HashSet<String>,
}

impl CorrelationIndex {
    pub fn rebuild<'a>(
        &mut self,
        entities: impl Iterator<Item = &'a Entity>,
        host_ips: impl Iterator<Item = String>,
    ) {
        self.ip_to_entity.clear();
        self.host_ips.clear();
        for ip in host_ips {
            self.ip_to_entity.insert(ip.clone(), HOST_ID.to_string());
            self.host_ips.insert(ip);
        }
        for entity in entities {
            if entity.kind.is_host() {
                continue;
            }
            if let Some(ip) = &entity.ip {
                self.ip_to_entity
                    .entry(ip.clone())
                    .or_insert_with(|| entity.id.clone());
            }
        }
    }

    pub fn is_host_ip(&self, ip: &str) -> bool {
        self.host_ips.contains(ip)
    }

    pub fn resolve(&self, ip: &str) -> Option<&String> {
        self.ip_to_entity.get(ip)
    }

    /// Attribute a packet: prefer the non-Host side, else any resolved side.
    pub fn attribute(&self, src: &str, dst: &str) -> Option<String> {
        let src_id = self.resolve(src);
        let dst_id = self.resolve(dst);
        match (src_id, dst_id) {
            (Some(s), _) if s != HOST_ID => Some(s.clone()),
            (_, Some(d)) if d != HOST_ID => Some(d.clone()),
            (Some(s), _) => Some(s.clone()),
            (_, Some(d)) => Some(d.clone()),
            (None, None) => None,
        }
    }
}

/// Per-peer aggregation counters, keyed by IP. Host IPs never enter.
#[derive(Debug, Default)]
pub struct Aggregates {
    pub protocols_by_ip: HashMap<String, BTreeMap<String, u64>>,
    pub bytes_by_ip: HashMap<String, u64>,
    pub packets_by_ip: HashMap<String, u64>,
}

impl Aggregates {
    pub fn record(&mut self, ip: &str, protocol: &str, length: u64) {
        *self
            .protocols_by_ip
            .entry(ip.to_string())
            .or_default()
            .entry(protocol.to_string())
            .or_insert(0) += 1;
        *self.bytes_by_ip.entry(ip.to_string()).or_insert(0) += length;
        *self.packets_by_ip.entry(ip.to_string()).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.protocols_by_ip.is_empty()
    }
}

/// Rolling per-IP TTL windows; the lower median is the representative value.
#[derive(Debug, Default)]
pub struct TtlWindows {
    samples: HashMap<String, VecDeque<u8>>,
}

impl TtlWindows {
    pub fn record(&mut self, ip: &str, ttl: u8) {
        let window = self.samples.entry(ip.to_string()).or_default();
        if window.len() == TTL_WINDOW {
            window.pop_front();
        }
        window.push_back(ttl);
    }

    pub fn median(&self, ip: &str) -> Option<u8> {
        let window = self.samples.get(ip)?;
        if window.is_empty() {
            return None;
        }
        let mut sorted: Vec<u8> = window.iter().copied().collect();
        sorted.sort_unstable();
        Some(sorted[(sorted.len() - 1) / 2])
    }
}

/// Bounded ring of recent packet events plus the pending drain queue.
/// Both share the same bound; with no consumer attached the pending queue
/// is truncated from the front exactly like the ring.
#[derive(Debug)]
pub struct EventRing {
    capacity: usize,
    ring: VecDeque<PacketEvent>,
    pending: VecDeque<PacketEvent>,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: VecDeque::with_capacity(capacity.min(1024)),
            pending: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: PacketEvent) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(event.clone());
        if self.pending.len() == self.capacity {
            self.pending.pop_front();
        }
        self.pending.push_back(event);
    }

    /// Take up to `max` pending events for the drain timer.
    pub fn drain_batch(&mut self, max: usize) -> Vec<PacketEvent> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn snapshot(&self) -> Vec<PacketEvent> {
        self.ring.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.pending.clear();
    }
}
