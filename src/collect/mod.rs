use crate::model::{Entity, Relation};
use async_trait::async_trait;

// Submodule declarations
pub mod bluetooth;
pub mod mdns;
pub mod neighbors;
pub mod sockets;
pub mod throughput;
pub mod topology;
pub mod wifi;

/// Entities and relations produced by one scan. Both lists represent fresh
/// observations as of now; either may be empty.
#[derive(Debug, Default, Clone)]
pub struct CollectorResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl CollectorResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// Environment collector contract
///
/// Each collector observes one slice of the surrounding network (neighbor
/// table, Wi-Fi subsystem, socket table, ...) and reports what it saw.
/// Collectors fail closed: any error is logged with a concise reason and
/// mapped to an empty result, never surfaced to the scheduler.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable collector name, used for scheduling and scan-now addressing
    fn name(&self) -> &'static str;

    /// Observe the environment and report fresh entities and relations.
    /// Event-driven collectors return their accumulated state here.
    async fn scan(&self) -> CollectorResult;
}

/// Map a dBm RSSI reading onto the normalized 0..100 strength scale.
/// -90 dBm and below floors at 0, -30 dBm and above saturates at 100.
pub fn signal_strength_from_rssi(rssi: i32) -> u8 {
    let scaled = (rssi + 90) * 100 / 60;
    scaled.clamp(0, 100) as u8
}

/// Pull the first signed integer out of a string: profiler RSSI fields come
/// as either a plain number or e.g. `"-55 dBm / -92 dBm"` where the first
/// value is signal and the second noise.
pub fn first_signed_int(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() || (bytes[i] == b'-' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            return text[start..i].parse().ok();
        }
        i += 1;
    }
    None
}
