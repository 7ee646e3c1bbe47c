//! MQTT v3.1 packet definitions

use std::sync::Arc;

use bytes::Bytes;

use super::{QoS, ReturnCode};

/// An MQTT v3.1 packet.
///
/// The engine dispatches on this closed set; QoS 2 flow packets decode so
/// that an unexpected PUBREC/PUBREL/PUBCOMP terminates the session as a
/// protocol violation instead of a framing error.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    Connect(Box<Connect>),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Wire packet type nibble
    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::Connect(_) => 1,
            Packet::ConnAck(_) => 2,
            Packet::Publish(_) => 3,
            Packet::PubAck(_) => 4,
            Packet::PubRec(_) => 5,
            Packet::PubRel(_) => 6,
            Packet::PubComp(_) => 7,
            Packet::Subscribe(_) => 8,
            Packet::SubAck(_) => 9,
            Packet::Unsubscribe(_) => 10,
            Packet::UnsubAck(_) => 11,
            Packet::PingReq => 12,
            Packet::PingResp => 13,
            Packet::Disconnect => 14,
        }
    }

    /// Human-readable packet name, used for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect(_) => "CONNECT",
            Packet::ConnAck(_) => "CONNACK",
            Packet::Publish(_) => "PUBLISH",
            Packet::PubAck(_) => "PUBACK",
            Packet::PubRec(_) => "PUBREC",
            Packet::PubRel(_) => "PUBREL",
            Packet::PubComp(_) => "PUBCOMP",
            Packet::Subscribe(_) => "SUBSCRIBE",
            Packet::SubAck(_) => "SUBACK",
            Packet::Unsubscribe(_) => "UNSUBSCRIBE",
            Packet::UnsubAck(_) => "UNSUBACK",
            Packet::PingReq => "PINGREQ",
            Packet::PingResp => "PINGRESP",
            Packet::Disconnect => "DISCONNECT",
        }
    }
}

/// CONNECT packet (client -> server)
///
/// Protocol name and level are carried verbatim so the engine can answer
/// an unknown protocol with `UnacceptableProtocolVersion` instead of
/// failing the decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub protocol_name: String,
    pub protocol_version: u8,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            protocol_name: super::PROTOCOL_NAME.to_string(),
            protocol_version: super::PROTOCOL_VERSION,
            client_id: String::new(),
            clean_session: true,
            keep_alive: 0,
            will: None,
            username: None,
            password: None,
        }
    }
}

/// Will message carried in CONNECT. Parsed but not published (will
/// delivery is out of scope for this broker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNACK packet (server -> client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAck {
    pub return_code: ReturnCode,
}

/// PUBLISH packet (bidirectional)
///
/// The topic is `Arc<str>` so fan-out clones are O(1); the payload is
/// `Bytes` for the same reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Arc<str>,
    /// Present on the wire only for QoS > 0; zero otherwise
    pub message_id: u16,
    pub payload: Bytes,
}

impl Default for Publish {
    fn default() -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Arc::from(""),
            message_id: 0,
            payload: Bytes::new(),
        }
    }
}

/// PUBACK packet (QoS 1 acknowledgement)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubAck {
    pub message_id: u16,
}

/// PUBREC packet (QoS 2, unsupported)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRec {
    pub message_id: u16,
}

/// PUBREL packet (QoS 2, unsupported)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRel {
    pub message_id: u16,
}

/// PUBCOMP packet (QoS 2, unsupported)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubComp {
    pub message_id: u16,
}

/// One requested (topic pattern, QoS) pair in a SUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicQos {
    pub topic: String,
    pub qos: QoS,
}

/// SUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub message_id: u16,
    pub topics: Vec<TopicQos>,
}

/// SUBACK packet (server -> client), granted QoS in request order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub message_id: u16,
    pub granted_qos: Vec<QoS>,
}

/// UNSUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub message_id: u16,
    pub topics: Vec<String>,
}

/// UNSUBACK packet (server -> client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubAck {
    pub message_id: u16,
}
