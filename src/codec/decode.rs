//! MQTT v3.1 packet decoder

use std::sync::Arc;

use super::{read_binary, read_string, read_u16, read_variable_int, to_bytes, DEFAULT_MAX_PACKET_SIZE};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Packet, PubAck, PubComp, PubRec, PubRel, Publish, QoS,
    ReturnCode, SubAck, Subscribe, TopicQos, UnsubAck, Unsubscribe, Will,
};

/// Incremental packet decoder.
///
/// Feed it the unconsumed front of the read buffer; a complete packet
/// comes back with the number of bytes it occupied, a short buffer comes
/// back as `None`.
pub struct Decoder {
    max_packet_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(super::MAX_REMAINING_LENGTH);
        self
    }

    /// Decode one packet from the front of `buf`.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let first_byte = buf[0];
        let packet_type = first_byte >> 4;
        let flags = first_byte & 0x0F;

        let (remaining_length, len_bytes) = match read_variable_int(&buf[1..]) {
            Ok(r) => r,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(e) => return Err(e),
        };

        if remaining_length as usize > self.max_packet_size {
            return Err(DecodeError::PacketTooLarge);
        }

        let total_len = 1 + len_bytes + remaining_length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let body = &buf[1 + len_bytes..total_len];

        let packet = match packet_type {
            1 => decode_connect(body)?,
            2 => decode_connack(flags, body)?,
            3 => decode_publish(flags, body)?,
            4 => Packet::PubAck(PubAck {
                message_id: expect_message_id(flags, body)?,
            }),
            5 => Packet::PubRec(PubRec {
                message_id: expect_message_id(flags, body)?,
            }),
            6 => Packet::PubRel(PubRel {
                message_id: expect_qos1_message_id(flags, body)?,
            }),
            7 => Packet::PubComp(PubComp {
                message_id: expect_message_id(flags, body)?,
            }),
            8 => decode_subscribe(flags, body)?,
            9 => decode_suback(flags, body)?,
            10 => decode_unsubscribe(flags, body)?,
            11 => Packet::UnsubAck(UnsubAck {
                message_id: expect_message_id(flags, body)?,
            }),
            12 => {
                require_zero_flags(flags)?;
                Packet::PingReq
            }
            13 => {
                require_zero_flags(flags)?;
                Packet::PingResp
            }
            14 => {
                require_zero_flags(flags)?;
                Packet::Disconnect
            }
            other => return Err(DecodeError::InvalidPacketType(other)),
        };

        Ok(Some((packet, total_len)))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn require_zero_flags(flags: u8) -> Result<(), DecodeError> {
    if flags != 0 {
        return Err(DecodeError::InvalidFlags);
    }
    Ok(())
}

/// Message-id-only body with zero fixed-header flags (PUBACK and friends)
fn expect_message_id(flags: u8, body: &[u8]) -> Result<u16, DecodeError> {
    require_zero_flags(flags)?;
    read_u16(body)
}

/// PUBREL carries the 0b0010 reserved flags
fn expect_qos1_message_id(flags: u8, body: &[u8]) -> Result<u16, DecodeError> {
    if flags != 0x02 {
        return Err(DecodeError::InvalidFlags);
    }
    read_u16(body)
}

fn decode_connect(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut pos = 0;

    // Protocol name and level pass through unvalidated; the engine answers
    // unknown protocols with a CONNACK return code.
    let (protocol_name, len) = read_string(&body[pos..])?;
    pos += len;

    if pos >= body.len() {
        return Err(DecodeError::InsufficientData);
    }
    let protocol_version = body[pos];
    pos += 1;

    if pos >= body.len() {
        return Err(DecodeError::InsufficientData);
    }
    let connect_flags = body[pos];
    pos += 1;

    let clean_session = (connect_flags & 0x02) != 0;
    let will_flag = (connect_flags & 0x04) != 0;
    let will_qos = (connect_flags >> 3) & 0x03;
    let will_retain = (connect_flags & 0x20) != 0;
    let password_flag = (connect_flags & 0x40) != 0;
    let username_flag = (connect_flags & 0x80) != 0;

    if will_qos > 2 {
        return Err(DecodeError::InvalidQoS(will_qos));
    }

    if pos + 2 > body.len() {
        return Err(DecodeError::InsufficientData);
    }
    let keep_alive = u16::from_be_bytes([body[pos], body[pos + 1]]);
    pos += 2;

    let (client_id, len) = read_string(&body[pos..])?;
    pos += len;

    let will = if will_flag {
        let (will_topic, len) = read_string(&body[pos..])?;
        pos += len;
        let (will_message, len) = read_binary(&body[pos..])?;
        pos += len;
        Some(Will {
            topic: will_topic.to_string(),
            message: to_bytes(will_message),
            qos: QoS::from_u8(will_qos).unwrap_or(QoS::AtMostOnce),
            retain: will_retain,
        })
    } else {
        None
    };

    let username = if username_flag {
        let (s, len) = read_string(&body[pos..])?;
        pos += len;
        Some(s.to_string())
    } else {
        None
    };

    let password = if password_flag {
        let (data, _len) = read_binary(&body[pos..])?;
        Some(to_bytes(data))
    } else {
        None
    };

    Ok(Packet::Connect(Box::new(Connect {
        protocol_name: protocol_name.to_string(),
        protocol_version,
        client_id: client_id.to_string(),
        clean_session,
        keep_alive,
        will,
        username,
        password,
    })))
}

fn decode_connack(flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
    require_zero_flags(flags)?;
    if body.len() < 2 {
        return Err(DecodeError::InsufficientData);
    }
    // body[0] is the reserved byte
    let return_code = ReturnCode::from_u8(body[1]).ok_or(DecodeError::InvalidFlags)?;
    Ok(Packet::ConnAck(ConnAck { return_code }))
}

fn decode_publish(flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
    let dup = (flags & 0x08) != 0;
    let qos_bits = (flags >> 1) & 0x03;
    let retain = (flags & 0x01) != 0;

    let qos = QoS::from_u8(qos_bits).ok_or(DecodeError::InvalidQoS(qos_bits))?;

    let mut pos = 0;
    let (topic, len) = read_string(&body[pos..])?;
    pos += len;

    let message_id = if qos != QoS::AtMostOnce {
        let id = read_u16(&body[pos..])?;
        pos += 2;
        id
    } else {
        0
    };

    Ok(Packet::Publish(Publish {
        dup,
        qos,
        retain,
        topic: Arc::from(topic),
        message_id,
        payload: to_bytes(&body[pos..]),
    }))
}

fn decode_subscribe(flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
    if flags != 0x02 {
        return Err(DecodeError::InvalidFlags);
    }

    let mut pos = 0;
    let message_id = read_u16(&body[pos..])?;
    pos += 2;

    let mut topics = Vec::new();
    while pos < body.len() {
        let (topic, len) = read_string(&body[pos..])?;
        pos += len;
        if pos >= body.len() {
            return Err(DecodeError::InsufficientData);
        }
        let qos_byte = body[pos];
        pos += 1;
        let qos = QoS::from_u8(qos_byte).ok_or(DecodeError::InvalidQoS(qos_byte))?;
        topics.push(TopicQos {
            topic: topic.to_string(),
            qos,
        });
    }

    Ok(Packet::Subscribe(Subscribe { message_id, topics }))
}

fn decode_suback(flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
    require_zero_flags(flags)?;
    let message_id = read_u16(body)?;
    let mut granted_qos = Vec::with_capacity(body.len().saturating_sub(2));
    for &b in &body[2..] {
        granted_qos.push(QoS::from_u8(b).ok_or(DecodeError::InvalidQoS(b))?);
    }
    Ok(Packet::SubAck(SubAck {
        message_id,
        granted_qos,
    }))
}

fn decode_unsubscribe(flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
    if flags != 0x02 {
        return Err(DecodeError::InvalidFlags);
    }

    let mut pos = 0;
    let message_id = read_u16(&body[pos..])?;
    pos += 2;

    let mut topics = Vec::new();
    while pos < body.len() {
        let (topic, len) = read_string(&body[pos..])?;
        pos += len;
        topics.push(topic.to_string());
    }

    Ok(Packet::Unsubscribe(Unsubscribe { message_id, topics }))
}
