use super::{first_signed_int, signal_strength_from_rssi, Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::constants::HOST_ID;
use crate::db::vendor::normalize_mac;
use crate::model::{Entity, Relation, RelationKind, SignalKind};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Device sections per controller. Key names drift across OS minor versions;
/// every present section is read and the results unioned.
const CONNECTED_SECTION: &str = "device_connected";
const DISCONNECTED_SECTIONS: &[&str] = &["device_not_connected", "devices_not_connected"];

/// Keys whose affirmative value marks a device as connected even inside a
/// not-connected section.
const CONNECTED_INDICATOR_KEYS: &[&str] =
    &["device_isconnected", "device_connected", "device_isConnected"];

/// Bluetooth peer collector backed by the system profiler.
pub struct BluetoothCollector {
    profiler_timeout: Duration,
}

impl BluetoothCollector {
    pub fn new(timeouts: &CommandTimeouts) -> Self {
        Self {
            profiler_timeout: timeouts.profiler,
        }
    }

    async fn scan_inner(&self) -> CollectorResult {
        let stdout = match cmd::run_complete(
            "system_profiler",
            &["SPBluetoothDataType", "-json"],
            self.profiler_timeout,
        )
        .await
        {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::warn!(collector = "bluetooth", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let json: Value = match serde_json::from_str(&stdout) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(collector = "bluetooth", "profiler output not JSON: {}", e);
                return CollectorResult::default();
            }
        };

        let mut result = CollectorResult::default();
        for peer in parse_profiler_json(&json) {
            let id = match &peer.mac {
                Some(mac) => format!("bt-{}", mac),
                None => format!("bt-{}", peer.name.replace(' ', "-")),
            };
            let mut entity = Entity::observed(
                id.clone(),
                SignalKind::Bluetooth {
                    minor_type: peer.minor_type.clone(),
                    is_connected: peer.is_connected,
                    battery_level: peer.battery_level,
                    rssi: peer.rssi,
                },
                peer.name.clone(),
            );
            if let Some(mac) = peer.mac {
                entity.mac = Some(mac);
            }
            if let Some(rssi) = peer.rssi {
                entity.signal_strength = Some(signal_strength_from_rssi(rssi));
            }
            result
                .relations
                .push(Relation::link(id, HOST_ID, RelationKind::ConnectedTo));
            result.entities.push(entity);
        }
        result
    }
}

#[async_trait]
impl Collector for BluetoothCollector {
    fn name(&self) -> &'static str {
        "bluetooth"
    }

    async fn scan(&self) -> CollectorResult {
        self.scan_inner().await
    }
}

#[derive(Debug, PartialEq)]
pub struct PeerRecord {
    pub name: String,
    pub mac: Option<String>,
    pub is_connected: bool,
    pub rssi: Option<i32>,
    pub battery_level: Option<i32>,
    pub minor_type: Option<String>,
}

/// Walk every controller's device sections. Devices are keyed by name, one
/// single-key object per list element.
pub fn parse_profiler_json(json: &Value) -> Vec<PeerRecord> {
    let mut peers = Vec::new();
    let Some(controllers) = json.get("SPBluetoothDataType").and_then(Value::as_array) else {
        return peers;
    };
    for controller in controllers {
        if let Some(devices) = controller.get(CONNECTED_SECTION).and_then(Value::as_array) {
            collect_section(devices, true, &mut peers);
        }
        for section in DISCONNECTED_SECTIONS {
            if let Some(devices) = controller.get(*section).and_then(Value::as_array) {
                collect_section(devices, false, &mut peers);
            }
        }
    }
    peers
}

fn collect_section(devices: &[Value], section_connected: bool, out: &mut Vec<PeerRecord>) {
    for device in devices {
        let Some(map) = device.as_object() else {
            continue;
        };
        for (name, attrs) in map {
            out.push(parse_device(name, attrs, section_connected));
        }
    }
}

fn parse_device(name: &str, attrs: &Value, section_connected: bool) -> PeerRecord {
    let mac = attrs
        .get("device_address")
        .and_then(Value::as_str)
        .and_then(normalize_mac);
    let is_connected = section_connected
        || CONNECTED_INDICATOR_KEYS
            .iter()
            .any(|key| is_affirmative(attrs.get(*key)));
    let rssi = attrs.get("device_rssi").and_then(parse_numeric);
    let battery_level = attrs
        .get("device_batteryLevel")
        .or_else(|| attrs.get("device_batteryLevelMain"))
        .and_then(parse_numeric);
    let minor_type = attrs
        .get("device_minorType")
        .and_then(Value::as_str)
        .map(str::to_string);
    PeerRecord {
        name: name.to_string(),
        mac,
        is_connected,
        rssi,
        battery_level,
        minor_type,
    }
}

fn is_affirmative(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            matches!(s.as_str(), "attrib_Yes" | "Yes" | "yes" | "true" | "TRUE")
        }
        _ => false,
    }
}

fn parse_numeric(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().map(|n| n as i32),
        Value::String(s) => first_signed_int(s),
        _ => None,
    }
}
