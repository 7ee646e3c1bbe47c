//! Protocol error types

/// Errors raised while decoding a packet from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes buffered for a complete field
    InsufficientData,
    /// Remaining-length field exceeds four bytes
    InvalidRemainingLength,
    /// Packet exceeds the configured maximum size
    PacketTooLarge,
    /// Unknown packet type nibble
    InvalidPacketType(u8),
    /// Fixed-header flags invalid for the packet type
    InvalidFlags,
    /// QoS value outside 0..=2
    InvalidQoS(u8),
    /// String field is not valid UTF-8
    InvalidUtf8,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InsufficientData => write!(f, "insufficient data"),
            DecodeError::InvalidRemainingLength => write!(f, "invalid remaining length"),
            DecodeError::PacketTooLarge => write!(f, "packet too large"),
            DecodeError::InvalidPacketType(t) => write!(f, "invalid packet type {}", t),
            DecodeError::InvalidFlags => write!(f, "invalid fixed header flags"),
            DecodeError::InvalidQoS(q) => write!(f, "invalid QoS {}", q),
            DecodeError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors raised while encoding a packet for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Remaining length would exceed the protocol maximum
    PacketTooLarge,
    /// A string or binary field exceeds its u16 length prefix
    FieldTooLarge,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::PacketTooLarge => write!(f, "packet too large"),
            EncodeError::FieldTooLarge => write!(f, "field exceeds length prefix"),
        }
    }
}

impl std::error::Error for EncodeError {}
