use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;

use super::{Decoder, Encoder};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Packet, PubAck, Publish, QoS, ReturnCode, SubAck, Subscribe,
    TopicQos, UnsubAck, Unsubscribe, Will,
};

fn roundtrip(packet: Packet) -> Packet {
    let mut buf = BytesMut::new();
    Encoder::new().encode(&packet, &mut buf).expect("encode");
    let (decoded, consumed) = Decoder::new()
        .decode(&buf)
        .expect("decode")
        .expect("complete packet");
    assert_eq!(consumed, buf.len());
    decoded
}

#[test]
fn connect_roundtrip() {
    let packet = Packet::Connect(Box::new(Connect {
        protocol_name: "MQIsdp".to_string(),
        protocol_version: 3,
        client_id: "sensor-7".to_string(),
        clean_session: true,
        keep_alive: 30,
        will: Some(Will {
            topic: "dead/sensor-7".to_string(),
            message: Bytes::from_static(b"gone"),
            qos: QoS::AtLeastOnce,
            retain: false,
        }),
        username: Some("alice".to_string()),
        password: Some(Bytes::from_static(b"secret")),
    }));
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn connect_keeps_unknown_protocol_fields() {
    // The decoder must not reject bad protocol names; the engine answers
    // them with a CONNACK return code.
    let packet = Packet::Connect(Box::new(Connect {
        protocol_name: "MQTT".to_string(),
        protocol_version: 99,
        client_id: "c".to_string(),
        ..Connect::default()
    }));
    match roundtrip(packet) {
        Packet::Connect(c) => {
            assert_eq!(c.protocol_name, "MQTT");
            assert_eq!(c.protocol_version, 99);
        }
        other => panic!("expected CONNECT, got {:?}", other),
    }
}

#[test]
fn connack_wire_layout() {
    let mut buf = BytesMut::new();
    Encoder::new()
        .encode(
            &Packet::ConnAck(ConnAck {
                return_code: ReturnCode::NotAuthorized,
            }),
            &mut buf,
        )
        .unwrap();
    assert_eq!(&buf[..], &[0x20, 0x02, 0x00, 0x05]);
}

#[test]
fn publish_qos0_roundtrip() {
    let packet = Packet::Publish(Publish {
        dup: false,
        qos: QoS::AtMostOnce,
        retain: false,
        topic: "room/1".into(),
        message_id: 0,
        payload: Bytes::from_static(&[0x68, 0x69]),
    });
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn publish_qos1_carries_message_id() {
    let packet = Packet::Publish(Publish {
        dup: true,
        qos: QoS::AtLeastOnce,
        retain: true,
        topic: "t".into(),
        message_id: 42,
        payload: Bytes::from_static(b"x"),
    });
    match roundtrip(packet) {
        Packet::Publish(p) => {
            assert!(p.dup);
            assert!(p.retain);
            assert_eq!(p.qos, QoS::AtLeastOnce);
            assert_eq!(p.message_id, 42);
        }
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn puback_roundtrip() {
    let packet = Packet::PubAck(PubAck { message_id: 42 });
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn subscribe_roundtrip() {
    let packet = Packet::Subscribe(Subscribe {
        message_id: 7,
        topics: vec![
            TopicQos {
                topic: "room/+".to_string(),
                qos: QoS::AtLeastOnce,
            },
            TopicQos {
                topic: "x/#".to_string(),
                qos: QoS::AtMostOnce,
            },
        ],
    });
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn suback_grants_in_order() {
    let packet = Packet::SubAck(SubAck {
        message_id: 7,
        granted_qos: vec![QoS::AtMostOnce, QoS::AtMostOnce],
    });
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn unsubscribe_roundtrip() {
    let packet = Packet::Unsubscribe(Unsubscribe {
        message_id: 9,
        topics: vec!["x/#".to_string()],
    });
    assert_eq!(roundtrip(packet.clone()), packet);
    assert_eq!(
        roundtrip(Packet::UnsubAck(UnsubAck { message_id: 9 })),
        Packet::UnsubAck(UnsubAck { message_id: 9 })
    );
}

#[test]
fn control_packets_are_two_bytes() {
    for (packet, first) in [
        (Packet::PingReq, 0xC0u8),
        (Packet::PingResp, 0xD0),
        (Packet::Disconnect, 0xE0),
    ] {
        let mut buf = BytesMut::new();
        Encoder::new().encode(&packet, &mut buf).unwrap();
        assert_eq!(&buf[..], &[first, 0x00]);
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn short_buffer_returns_none() {
    let decoder = Decoder::new();
    assert_eq!(decoder.decode(&[]).unwrap(), None);
    assert_eq!(decoder.decode(&[0x30]).unwrap(), None);
    // Header promises 10 body bytes but only 2 arrived
    assert_eq!(decoder.decode(&[0x30, 0x0A, 0x00, 0x01]).unwrap(), None);
}

#[test]
fn two_packets_in_one_buffer() {
    let mut buf = BytesMut::new();
    let encoder = Encoder::new();
    encoder.encode(&Packet::PingReq, &mut buf).unwrap();
    encoder
        .encode(&Packet::PubAck(PubAck { message_id: 1 }), &mut buf)
        .unwrap();

    let decoder = Decoder::new();
    let (first, consumed) = decoder.decode(&buf).unwrap().unwrap();
    assert_eq!(first, Packet::PingReq);
    let (second, _) = decoder.decode(&buf[consumed..]).unwrap().unwrap();
    assert_eq!(second, Packet::PubAck(PubAck { message_id: 1 }));
}

#[test]
fn pingreq_with_flags_is_rejected() {
    let err = Decoder::new().decode(&[0xC1, 0x00]).unwrap_err();
    assert_eq!(err, DecodeError::InvalidFlags);
}

#[test]
fn unknown_packet_type_is_rejected() {
    let err = Decoder::new().decode(&[0xF0, 0x00]).unwrap_err();
    assert_eq!(err, DecodeError::InvalidPacketType(15));
}

#[test]
fn oversized_packet_is_rejected() {
    let decoder = Decoder::new().with_max_packet_size(16);
    let publish = Packet::Publish(Publish {
        topic: "t".into(),
        payload: Bytes::from(vec![0u8; 64]),
        ..Publish::default()
    });
    let mut buf = BytesMut::new();
    Encoder::new().encode(&publish, &mut buf).unwrap();
    assert_eq!(decoder.decode(&buf).unwrap_err(), DecodeError::PacketTooLarge);
}

#[test]
fn publish_qos3_is_rejected() {
    // flags 0b0110 = QoS 3
    let err = Decoder::new()
        .decode(&[0x36, 0x03, 0x00, 0x01, b't'])
        .unwrap_err();
    assert_eq!(err, DecodeError::InvalidQoS(3));
}
