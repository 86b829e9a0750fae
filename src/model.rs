use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle status of a discovered entity. Transitions only advance
/// `active → stale → expired` until a fresh observation resets to `active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Stale,
    Expired,
}

/// One of the host's own addressed interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInterface {
    pub name: String,
    pub ipv4: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// Wi-Fi frequency band, derived from the channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
    #[serde(rename = "6GHz")]
    Ghz6,
}

impl Band {
    pub fn from_channel(channel: u32) -> Self {
        if channel > 177 {
            Band::Ghz6
        } else if channel > 14 {
            Band::Ghz5
        } else {
            Band::Ghz2_4
        }
    }
}

/// Variant-specific payload of a discovered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signalType", rename_all = "camelCase")]
pub enum SignalKind {
    #[serde(rename = "host", rename_all = "camelCase")]
    Host {
        hostname: String,
        interfaces: Vec<HostInterface>,
    },
    #[serde(rename = "wifi", rename_all = "camelCase")]
    WifiAp {
        ssid: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bssid: Option<String>,
        channel: u32,
        band: Band,
        #[serde(skip_serializing_if = "Option::is_none")]
        security: Option<String>,
        is_connected: bool,
    },
    #[serde(rename = "lan", rename_all = "camelCase")]
    Lan {
        interface: String,
        is_gateway: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        vendor: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        product_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        icon_key: Option<String>,
    },
    #[serde(rename = "bluetooth", rename_all = "camelCase")]
    Bluetooth {
        #[serde(skip_serializing_if = "Option::is_none")]
        minor_type: Option<String>,
        is_connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        battery_level: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rssi: Option<i32>,
    },
    #[serde(rename = "bonjour", rename_all = "camelCase")]
    Mdns {
        service_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
    #[serde(rename = "connection", rename_all = "camelCase")]
    Socket {
        protocol: String,
        local_port: u16,
        remote_port: u16,
        remote_host: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
        process_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolved_hostname: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_name: Option<String>,
    },
}

impl SignalKind {
    pub fn is_host(&self) -> bool {
        matches!(self, SignalKind::Host { .. })
    }
}

/// A discovered signal endpoint: the common envelope plus a variant payload.
///
/// Identity is carried entirely by `id`; re-observation of the same
/// underlying endpoint always derives the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    #[serde(flatten)]
    pub kind: SignalKind,
    pub name: String,
    pub status: EntityStatus,
    pub first_seen: Millis,
    pub last_seen: Millis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Normalized signal strength, 0..100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocols: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_packets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_fingerprint_confidence: Option<f64>,
    /// Attached at the publish boundary only; never present in the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_in_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_out_per_sec: Option<f64>,
}

impl Entity {
    /// Fresh observation with unset timestamps; the store assigns both on
    /// upsert.
    pub fn observed(id: impl Into<String>, kind: SignalKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            status: EntityStatus::Active,
            first_seen: 0,
            last_seen: 0,
            mac: None,
            ip: None,
            signal_strength: None,
            protocols: None,
            total_bytes: None,
            total_packets: None,
            os_family: None,
            os_version: None,
            device_category: None,
            os_fingerprint_confidence: None,
            bytes_per_sec: None,
            bytes_in_per_sec: None,
            bytes_out_per_sec: None,
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_signal_strength(mut self, strength: u8) -> Self {
        self.signal_strength = Some(strength);
        self
    }

    /// Merge a fresh observation of the same entity into this one.
    /// Envelope fields the observation did not set survive from the previous
    /// state, so enrichment results outlive re-observation.
    pub fn merge_observation(&mut self, incoming: Entity) {
        self.name = incoming.name;
        if incoming.mac.is_some() {
            self.mac = incoming.mac;
        }
        if incoming.ip.is_some() {
            self.ip = incoming.ip;
        }
        if incoming.signal_strength.is_some() {
            self.signal_strength = incoming.signal_strength;
        }
        let previous = self.kind.clone();
        self.kind = merge_kind(previous, incoming.kind);
    }
}

fn merge_kind(old: SignalKind, new: SignalKind) -> SignalKind {
    match (old, new) {
        (
            SignalKind::Lan {
                vendor: old_vendor,
                device_type: old_dt,
                product_name: old_pn,
                icon_key: old_icon,
                ..
            },
            SignalKind::Lan {
                interface,
                is_gateway,
                vendor,
                device_type,
                product_name,
                icon_key,
            },
        ) => SignalKind::Lan {
            interface,
            is_gateway,
            vendor: vendor.or(old_vendor),
            device_type: device_type.or(old_dt),
            product_name: product_name.or(old_pn),
            icon_key: icon_key.or(old_icon),
        },
        (
            SignalKind::Bluetooth {
                battery_level: old_battery,
                rssi: old_rssi,
                minor_type: old_minor,
                ..
            },
            SignalKind::Bluetooth {
                minor_type,
                is_connected,
                battery_level,
                rssi,
            },
        ) => SignalKind::Bluetooth {
            minor_type: minor_type.or(old_minor),
            is_connected,
            battery_level: battery_level.or(old_battery),
            rssi: rssi.or(old_rssi),
        },
        // Remaining variants carry full state in every observation.
        (_, new) => new,
    }
}

/// Enrichment-only field updates. Applying a patch never touches lifecycle
/// state; absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct EntityPatch {
    pub device_type: Option<String>,
    pub product_name: Option<String>,
    pub icon_key: Option<String>,
    pub os_family: Option<String>,
    pub os_version: Option<String>,
    pub device_category: Option<String>,
    pub os_fingerprint_confidence: Option<f64>,
    pub protocols: Option<BTreeMap<String, u64>>,
    pub total_bytes: Option<u64>,
    pub total_packets: Option<u64>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.device_type.is_none()
            && self.product_name.is_none()
            && self.icon_key.is_none()
            && self.os_family.is_none()
            && self.os_version.is_none()
            && self.device_category.is_none()
            && self.os_fingerprint_confidence.is_none()
            && self.protocols.is_none()
            && self.total_bytes.is_none()
            && self.total_packets.is_none()
    }
}

/// Directed edge kinds between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ConnectedTo,
    HostsService,
    Gateway,
    SameDevice,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::ConnectedTo => "connected_to",
            RelationKind::HostsService => "hosts_service",
            RelationKind::Gateway => "gateway",
            RelationKind::SameDevice => "same_device",
        }
    }
}

/// Directed labeled edge between two entities. The id is a pure function of
/// `(source, target, kind)`, so re-observation deduplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_in_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_out_per_sec: Option<f64>,
}

impl Relation {
    pub fn link(source: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        let source = source.into();
        let target = target.into();
        let id = format!("{}|{}|{}", source, target, kind.as_str());
        Self {
            id,
            source,
            target,
            kind,
            bytes_per_sec: None,
            bytes_in_per_sec: None,
            bytes_out_per_sec: None,
        }
    }
}

/// A directly attached IPv4 subnet, published on the topology side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub cidr: String,
    pub network: String,
    pub prefix_len: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub interface: String,
    pub local_ip: String,
}

/// A single captured packet, attributed to an entity where the correlation
/// index resolves one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketEvent {
    pub id: String,
    pub timestamp: Millis,
    pub node_id: Option<String>,
    pub src_ip: String,
    pub dst_ip: String,
    pub protocol: String,
    pub length: u64,
    pub info: String,
}
