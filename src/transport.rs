use crate::model::{Entity, Millis, PacketEvent, Relation, Subnet};
use serde::{Deserialize, Serialize};

/// Messages the engine pushes to the consumer. Snapshot payloads carry the
/// complete current entity and relation set; `removed` is the only delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    FullState {
        entities: Vec<Entity>,
        relations: Vec<Relation>,
        timestamp: Millis,
    },
    NodeUpdate {
        entities: Vec<Entity>,
        relations: Vec<Relation>,
        removed: Vec<String>,
        timestamp: Millis,
    },
    Topology {
        subnets: Vec<Subnet>,
        timestamp: Millis,
    },
    PacketEvent {
        event: PacketEvent,
    },
}

/// Requests arriving from the consumer on the control surface.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Pause,
    Resume,
    ScanNow {
        #[serde(default)]
        collector: Option<String>,
    },
    GetFullState,
    PacketStart {
        #[serde(default)]
        interface: Option<String>,
    },
    PacketStop,
    PacketStatus,
    PacketGetEvents,
    NmapScan {
        ip: String,
    },
    NmapStatus,
}

/// Replies on the request/response half of the control surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    #[serde(rename_all = "camelCase")]
    Ack { ok: bool },
    #[serde(rename_all = "camelCase")]
    PacketStart {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PacketStatus {
        available: bool,
        has_permission: bool,
        capturing: bool,
        interface: Option<String>,
        interfaces: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PacketEvents { events: Vec<PacketEvent> },
    #[serde(rename_all = "camelCase")]
    NmapScan {
        success: bool,
        ip: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        os_family: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        os_version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    NmapStatus { available: bool },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

/// Outbound half of the transport. Implementations must not block the
/// caller; the engine publishes from its writer context.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: &OutboundMessage);
}

/// Line-delimited JSON on stdout; the default transport of the binary.
pub struct JsonLinePublisher;

impl Publisher for JsonLinePublisher {
    fn publish(&self, message: &OutboundMessage) {
        match serde_json::to_string(message) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("failed to encode outbound message: {}", e),
        }
    }
}
