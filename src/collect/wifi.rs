use super::{first_signed_int, signal_strength_from_rssi, Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::constants::{HOST_ID, PRIMARY_WIFI_INTERFACE};
use crate::model::{Band, Entity, Relation, RelationKind, SignalKind};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// SSID literal the OS substitutes when location permission is missing.
const REDACTED_SSID: &str = "<redacted>";
/// Display fallback when no SSID can be recovered at all.
const FALLBACK_SSID: &str = "Connected Wi-Fi";

/// Wi-Fi collector
///
/// Asks the system profiler for the Wi-Fi subsystem in structured form and
/// reports the currently associated access point per interface.
pub struct WifiCollector {
    profiler_timeout: Duration,
}

impl WifiCollector {
    pub fn new(timeouts: &CommandTimeouts) -> Self {
        Self {
            profiler_timeout: timeouts.profiler,
        }
    }

    async fn scan_inner(&self) -> CollectorResult {
        let stdout = match cmd::run_complete(
            "system_profiler",
            &["SPAirPortDataType", "-json"],
            self.profiler_timeout,
        )
        .await
        {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::warn!(collector = "wifi", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let json: Value = match serde_json::from_str(&stdout) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(collector = "wifi", "profiler output not JSON: {}", e);
                return CollectorResult::default();
            }
        };

        let mut result = CollectorResult::default();
        for ap in parse_profiler_json(&json) {
            let ssid = if ap.ssid == REDACTED_SSID {
                preferred_network_fallback(self.profiler_timeout)
                    .await
                    .unwrap_or_else(|| FALLBACK_SSID.to_string())
            } else {
                ap.ssid
            };

            let id = format!("wifi-{}", ssid);
            let mut entity = Entity::observed(
                id.clone(),
                SignalKind::WifiAp {
                    ssid: ssid.clone(),
                    bssid: ap.bssid.clone(),
                    channel: ap.channel,
                    band: Band::from_channel(ap.channel),
                    security: ap.security.clone(),
                    is_connected: true,
                },
                ssid,
            );
            if let Some(bssid) = ap.bssid {
                entity.mac = Some(bssid);
            }
            if let Some(rssi) = ap.rssi {
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
impl Collector for WifiCollector {
    fn name(&self) -> &'static str {
        "wifi"
    }

    async fn scan(&self) -> CollectorResult {
        self.scan_inner().await
    }
}

#[derive(Debug, PartialEq)]
pub struct ApRecord {
    pub ssid: String,
    pub bssid: Option<String>,
    pub channel: u32,
    pub rssi: Option<i32>,
    pub security: Option<String>,
}

/// Walk the profiler JSON and keep interfaces that report a current-network
/// station record with a channel.
pub fn parse_profiler_json(json: &Value) -> Vec<ApRecord> {
    let mut records = Vec::new();
    let Some(sections) = json.get("SPAirPortDataType").and_then(Value::as_array) else {
        return records;
    };
    for section in sections {
        let Some(interfaces) = section
            .get("spairport_airport_interfaces")
            .and_then(Value::as_array)
        else {
            continue;
        };
        for iface in interfaces {
            let Some(current) = iface.get("spairport_current_network_information") else {
                continue;
            };
            let Some(channel) = current
                .get("spairport_network_channel")
                .and_then(parse_channel)
            else {
                continue;
            };
            let ssid = current
                .get("_name")
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_SSID)
                .to_string();
            let bssid = current
                .get("spairport_network_bssid")
                .and_then(Value::as_str)
                .map(str::to_string);
            let rssi = current.get("spairport_signal_noise").and_then(parse_rssi);
            let security = current
                .get("spairport_security_mode")
                .and_then(Value::as_str)
                .map(security_label);
            records.push(ApRecord {
                ssid,
                bssid,
                channel,
                rssi,
                security,
            });
        }
    }
    records
}

fn parse_channel(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => first_signed_int(s).and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

/// RSSI fields come as a plain integer or as a string whose first signed
/// integer is the signal (the second is noise).
pub fn parse_rssi(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().map(|n| n as i32),
        Value::String(s) => first_signed_int(s),
        _ => None,
    }
}

/// `spairport_security_mode_wpa2_personal` → `WPA2 Personal`
pub fn security_label(raw: &str) -> String {
    let stripped = raw.strip_prefix("spairport_security_mode_").unwrap_or(raw);
    stripped
        .split('_')
        .map(|token| {
            if token.starts_with("wpa") || token.starts_with("wep") {
                token.to_uppercase()
            } else {
                let mut chars = token.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-shot SSID recovery via the preferred-networks listing for the primary
/// Wi-Fi interface. Returns the first listed network.
async fn preferred_network_fallback(deadline: Duration) -> Option<String> {
    let stdout = cmd::run_complete(
        "networksetup",
        &["-listpreferredwirelessnetworks", PRIMARY_WIFI_INTERFACE],
        deadline,
    )
    .await
    .ok()?;
    first_preferred_network(&stdout)
}

/// The listing starts with a header line; networks follow indented.
pub fn first_preferred_network(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
