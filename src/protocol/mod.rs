//! MQTT v3.1 protocol definitions
//!
//! Packet types, quality-of-service levels and CONNACK return codes as
//! defined by the MQTT v3.1 specification (protocol name "MQIsdp").

mod error;
mod packet;

pub use error::{DecodeError, EncodeError};
pub use packet::{
    ConnAck, Connect, Packet, PubAck, PubComp, PubRec, PubRel, Publish, SubAck, Subscribe,
    TopicQos, UnsubAck, Unsubscribe, Will,
};

/// Protocol name carried in the CONNECT variable header.
pub const PROTOCOL_NAME: &str = "MQIsdp";

/// Protocol level carried in the CONNECT variable header.
pub const PROTOCOL_VERSION: u8 = 3;

/// v3.1 caps client identifiers at 23 characters.
pub const MAX_CLIENT_ID_LENGTH: usize = 23;

/// Quality of service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget
    AtMostOnce = 0,
    /// Acknowledged delivery
    AtLeastOnce = 1,
    /// Assured delivery (not implemented by this broker)
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// CONNACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ReturnCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReturnCode::Accepted),
            1 => Some(ReturnCode::UnacceptableProtocolVersion),
            2 => Some(ReturnCode::IdentifierRejected),
            3 => Some(ReturnCode::ServerUnavailable),
            4 => Some(ReturnCode::BadUsernameOrPassword),
            5 => Some(ReturnCode::NotAuthorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let desc = match self {
            ReturnCode::Accepted => "connection accepted",
            ReturnCode::UnacceptableProtocolVersion => "unacceptable protocol version",
            ReturnCode::IdentifierRejected => "identifier rejected",
            ReturnCode::ServerUnavailable => "server unavailable",
            ReturnCode::BadUsernameOrPassword => "bad user name or password",
            ReturnCode::NotAuthorized => "not authorized",
        };
        f.write_str(desc)
    }
}
