//! MQTT v5 packet types, fixed header, and the per-packet codecs this
//! server implements: CONNECT and PUBLISH decode, CONNACK, DISCONNECT
//! and PINGRESP encode.

use bytes::Bytes;

use crate::decode::Decoder;
use crate::error::{DecodeError, DecodeResult};
use crate::properties::{
    ConnackProperties, ConnectProperties, PublishProperties, WillProperties,
};
use crate::varint;

/// MQTT Control Packet Types (4 bits). 0 is reserved and rejected at
/// parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            15 => Ok(PacketType::Auth),
            v => Err(DecodeError::Malformed(format!(
                "invalid control packet type {}",
                v
            ))),
        }
    }
}

/// Quality of Service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
#[allow(clippy::enum_variant_names)] // MQTT spec names
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(DecodeError::Malformed(format!("invalid QoS: {}", value))),
        }
    }
}

/// MQTT v5 Reason Codes (CONNACK, DISCONNECT and friends). Constants
/// rather than an enum since some codes share a numeric value across
/// packet types.
#[allow(dead_code)]
pub mod reason_code {
    pub const SUCCESS: u8 = 0x00;
    pub const NORMAL_DISCONNECTION: u8 = 0x00;
    pub const UNSPECIFIED_ERROR: u8 = 0x80;
    pub const MALFORMED_PACKET: u8 = 0x81;
    pub const PROTOCOL_ERROR: u8 = 0x82;
    pub const IMPLEMENTATION_SPECIFIC_ERROR: u8 = 0x83;
    pub const UNSUPPORTED_PROTOCOL_VERSION: u8 = 0x84;
    pub const CLIENT_IDENTIFIER_NOT_VALID: u8 = 0x85;
    pub const BAD_USER_NAME_OR_PASSWORD: u8 = 0x86;
    pub const NOT_AUTHORIZED: u8 = 0x87;
    pub const SERVER_UNAVAILABLE: u8 = 0x88;
    pub const SERVER_BUSY: u8 = 0x89;
    pub const BANNED: u8 = 0x8A;
    pub const KEEP_ALIVE_TIMEOUT: u8 = 0x8D;
    pub const TOPIC_NAME_INVALID: u8 = 0x90;
    pub const PACKET_TOO_LARGE: u8 = 0x95;
    pub const QUOTA_EXCEEDED: u8 = 0x97;
    pub const PAYLOAD_FORMAT_INVALID: u8 = 0x99;
    pub const RETAIN_NOT_SUPPORTED: u8 = 0x9A;
    pub const QOS_NOT_SUPPORTED: u8 = 0x9B;
    pub const USE_ANOTHER_SERVER: u8 = 0x9C;
    pub const SERVER_MOVED: u8 = 0x9D;
    pub const CONNECTION_RATE_EXCEEDED: u8 = 0x9F;
}

/// The two-part control-packet preamble: type + flag nibble, then the
/// body length as a Variable Byte Integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    /// Raw low nibble; interpreted per packet type.
    pub flags: u8,
    /// Exact body length the connection must read next.
    pub remaining_len: usize,
}

impl FixedHeader {
    /// Parse the control byte and remaining length.
    pub fn parse(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let control = dec.read_u8()?;
        let packet_type = PacketType::try_from(control >> 4)?;
        let flags = control & 0x0F;
        let remaining_len = dec.read_variable_byte_integer()? as usize;
        Ok(Self {
            packet_type,
            flags,
            remaining_len,
        })
    }

    /// Emit the inverse of [`FixedHeader::parse`]: one control byte plus
    /// 1..4 length bytes.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(((self.packet_type as u8) << 4) | (self.flags & 0x0F));
        varint::encode_to_vec(self.remaining_len as u32, buf);
    }

    /// Enforce the mandated flag nibble for packet types that carry a
    /// fixed pattern. PUBLISH is the only type with per-packet flags.
    pub fn validate_flags(&self) -> DecodeResult<()> {
        let expected = match self.packet_type {
            PacketType::Publish => return Ok(()),
            PacketType::Pubrel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
            _ => 0x00,
        };
        if self.flags != expected {
            return Err(DecodeError::Malformed(format!(
                "{:?} fixed header flags must be {:#04x}, got {:#04x}",
                self.packet_type, expected, self.flags
            )));
        }
        Ok(())
    }
}

/// CONNECT packet data.
#[derive(Debug, Clone)]
pub struct Connect {
    pub clean_start: bool,
    /// Keep alive interval in seconds; 0 disables the idle watchdog.
    pub keep_alive: u16,
    pub properties: ConnectProperties,
    /// May be empty; the server is allowed to assign one.
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

/// Will message configuration from the CONNECT payload.
#[derive(Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub properties: WillProperties,
}

/// PUBLISH packet data.
#[derive(Debug, Clone)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Present only when qos > 0.
    pub packet_id: Option<u16>,
    pub properties: PublishProperties,
    pub payload: Bytes,
}

/// CONNACK packet data.
#[derive(Debug, Clone)]
pub struct Connack {
    pub session_present: bool,
    pub reason_code: u8,
    pub properties: ConnackProperties,
}

const PROTOCOL_PREAMBLE: [u8; 6] = [0x00, 0x04, b'M', b'Q', b'T', b'T'];
const PROTOCOL_LEVEL: u8 = 5;

/// Decode a CONNECT body of exactly the fixed header's remaining length.
pub fn decode_connect(body: &[u8]) -> DecodeResult<Connect> {
    let mut dec = Decoder::new(body);

    let preamble = dec.read_bytes(PROTOCOL_PREAMBLE.len()).map_err(|_| {
        DecodeError::UnsupportedProtocolVersion("truncated protocol name".into())
    })?;
    if preamble != PROTOCOL_PREAMBLE {
        return Err(DecodeError::UnsupportedProtocolVersion(
            "protocol name is not MQTT".into(),
        ));
    }

    let level = dec.read_u8().map_err(|_| {
        DecodeError::UnsupportedProtocolVersion("missing protocol level".into())
    })?;
    if level != PROTOCOL_LEVEL {
        return Err(DecodeError::UnsupportedProtocolVersion(format!(
            "protocol level {}",
            level
        )));
    }

    let flags = dec.read_u8()?;
    // MQTT-3.1.2-3: the reserved bit must be 0
    if flags & 0x01 != 0 {
        return Err(DecodeError::Malformed(
            "reserved connect flag bit must be 0".into(),
        ));
    }
    let will_flag = flags & 0x04 != 0;
    let will_qos_bits = (flags >> 3) & 0x03;
    if will_qos_bits == 3 {
        return Err(DecodeError::Malformed("invalid will QoS 3".into()));
    }
    // MQTT-3.1.2-11: Will QoS requires the Will Flag
    if !will_flag && will_qos_bits != 0 {
        return Err(DecodeError::Protocol(
            "will QoS set without will flag".into(),
        ));
    }
    let will_retain = flags & 0x20 != 0;
    let clean_start = flags & 0x02 != 0;
    let password_flag = flags & 0x40 != 0;
    let username_flag = flags & 0x80 != 0;

    let keep_alive = dec.read_u16()?;
    let properties = ConnectProperties::decode(&mut dec)?;

    let client_id = dec.read_string()?;

    let will = if will_flag {
        let will_properties = WillProperties::decode(&mut dec)?;
        let topic = dec.read_string()?;
        let payload = dec.read_binary()?;
        Some(Will {
            topic,
            payload,
            qos: QoS::try_from(will_qos_bits)?,
            retain: will_retain,
            properties: will_properties,
        })
    } else {
        None
    };

    let username = if username_flag {
        Some(dec.read_string()?)
    } else {
        None
    };

    let password = if password_flag {
        Some(dec.read_binary()?)
    } else {
        None
    };

    if !dec.is_empty() {
        return Err(DecodeError::Malformed(format!(
            "{} bytes left after CONNECT payload",
            dec.remaining()
        )));
    }

    Ok(Connect {
        clean_start,
        keep_alive,
        properties,
        client_id,
        will,
        username,
        password,
    })
}

/// Decode a PUBLISH body. The flag nibble comes from the fixed header:
/// dup is bit 3, qos bits 2-1, retain bit 0.
pub fn decode_publish(flags: u8, body: &[u8]) -> DecodeResult<Publish> {
    let dup = flags & 0x08 != 0;
    let qos = QoS::try_from((flags >> 1) & 0x03)?;
    let retain = flags & 0x01 != 0;

    let mut dec = Decoder::new(body);

    // Wildcard and null checks on the topic name belong to the routing
    // layer, not the codec.
    let topic = dec.read_string()?;

    let packet_id = if qos != QoS::AtMostOnce {
        Some(dec.read_u16()?)
    } else {
        None
    };

    let properties = PublishProperties::decode(&mut dec)?;
    let payload = Bytes::copy_from_slice(dec.take_rest());

    Ok(Publish {
        dup,
        qos,
        retain,
        topic,
        packet_id,
        properties,
        payload,
    })
}

/// Decode a DISCONNECT body into its reason code. An empty body means a
/// normal disconnection; trailing properties are skipped.
pub fn decode_disconnect(body: &[u8]) -> DecodeResult<u8> {
    if body.is_empty() {
        return Ok(reason_code::NORMAL_DISCONNECTION);
    }
    let mut dec = Decoder::new(body);
    let rc = dec.read_u8()?;
    if !dec.is_empty() {
        let prop_len = dec.read_variable_byte_integer()? as usize;
        dec.read_bytes(prop_len)?;
    }
    Ok(rc)
}

/// Encode a CONNACK packet.
pub fn encode_connack(connack: &Connack, buf: &mut Vec<u8>) {
    let mut var_header = Vec::new();
    var_header.push(connack.session_present as u8);
    var_header.push(connack.reason_code);
    connack.properties.encode(&mut var_header);

    FixedHeader {
        packet_type: PacketType::Connack,
        flags: 0,
        remaining_len: var_header.len(),
    }
    .encode(buf);
    buf.extend_from_slice(&var_header);
}

/// Encode a DISCONNECT packet. A normal disconnection has an empty body.
pub fn encode_disconnect(reason_code: u8, buf: &mut Vec<u8>) {
    let remaining_len = if reason_code == reason_code::NORMAL_DISCONNECTION {
        0
    } else {
        1
    };
    FixedHeader {
        packet_type: PacketType::Disconnect,
        flags: 0,
        remaining_len,
    }
    .encode(buf);
    if remaining_len > 0 {
        buf.push(reason_code);
    }
}

/// Encode a PINGRESP packet.
pub fn encode_pingresp(buf: &mut Vec<u8>) {
    FixedHeader {
        packet_type: PacketType::Pingresp,
        flags: 0,
        remaining_len: 0,
    }
    .encode(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The reference 40-byte CONNECT: client id `testClient`, username
    /// `testUser`, session expiry 30s, keep alive 30s.
    const CONNECT_PACKET: [u8; 40] = [
        0x10, 0x26, 0x00, 0x04, 0x4D, 0x51, 0x54, 0x54, 0x05, 0x80, 0x00, 0x1E, 0x05, 0x11,
        0x00, 0x00, 0x00, 0x1E, 0x00, 0x0A, 0x74, 0x65, 0x73, 0x74, 0x43, 0x6C, 0x69, 0x65,
        0x6E, 0x74, 0x00, 0x08, 0x74, 0x65, 0x73, 0x74, 0x55, 0x73, 0x65, 0x72,
    ];

    #[test]
    fn test_fixed_header_parse() {
        let mut dec = Decoder::new(&CONNECT_PACKET);
        let header = FixedHeader::parse(&mut dec).unwrap();
        assert_eq!(header.packet_type, PacketType::Connect);
        assert_eq!(header.flags, 0);
        assert_eq!(header.remaining_len, 38);
        assert_eq!(dec.remaining(), 38);
    }

    #[test]
    fn test_fixed_header_empty_input() {
        let err = FixedHeader::parse(&mut Decoder::new(&[])).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_fixed_header_reserved_type() {
        let err = FixedHeader::parse(&mut Decoder::new(&[0x00, 0x00])).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_fixed_header_roundtrip() {
        for raw_type in 1u8..=15 {
            for flags in 0u8..=15 {
                for len in [0usize, 1, 127, 128, 16383, 16384, 2097152, 268435455] {
                    let header = FixedHeader {
                        packet_type: PacketType::try_from(raw_type).unwrap(),
                        flags,
                        remaining_len: len,
                    };
                    let mut buf = Vec::new();
                    header.encode(&mut buf);
                    let parsed = FixedHeader::parse(&mut Decoder::new(&buf)).unwrap();
                    assert_eq!(parsed, header);
                }
            }
        }
    }

    #[test]
    fn test_validate_flags() {
        let ok = FixedHeader {
            packet_type: PacketType::Connect,
            flags: 0,
            remaining_len: 0,
        };
        assert!(ok.validate_flags().is_ok());

        let bad = FixedHeader {
            packet_type: PacketType::Connect,
            flags: 0x01,
            remaining_len: 0,
        };
        assert!(bad.validate_flags().is_err());

        // PUBLISH carries per-packet flags
        let publish = FixedHeader {
            packet_type: PacketType::Publish,
            flags: 0x0B,
            remaining_len: 0,
        };
        assert!(publish.validate_flags().is_ok());
    }

    #[test]
    fn test_decode_connect_reference_packet() {
        let connect = decode_connect(&CONNECT_PACKET[2..]).unwrap();
        assert_eq!(connect.client_id, "testClient");
        assert_eq!(connect.username.as_deref(), Some("testUser"));
        assert_eq!(connect.keep_alive, 30);
        assert_eq!(connect.properties.session_expiry_interval, 30);
        assert!(connect.password.is_none());
        assert!(connect.will.is_none());
        assert!(!connect.clean_start);
    }

    #[test]
    fn test_decode_connect_bad_protocol_name() {
        // `MQTU` instead of `MQTT`
        let mut body = CONNECT_PACKET[2..].to_vec();
        body[5] = b'U';
        let err = decode_connect(&body).unwrap_err();
        assert!(
            matches!(err, DecodeError::UnsupportedProtocolVersion(_)),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_decode_connect_bad_protocol_level() {
        let mut body = CONNECT_PACKET[2..].to_vec();
        body[6] = 4; // MQTT 3.1.1
        let err = decode_connect(&body).unwrap_err();
        assert!(
            matches!(err, DecodeError::UnsupportedProtocolVersion(_)),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_decode_connect_reserved_flag_bit() {
        let mut body = CONNECT_PACKET[2..].to_vec();
        body[7] |= 0x01;
        let err = decode_connect(&body).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_decode_connect_duplicate_property() {
        // Rebuild the reference packet with the session expiry property
        // repeated in the CONNECT property block.
        let mut body = vec![0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x80, 0x00, 0x1E];
        body.push(0x0A);
        body.extend_from_slice(&[0x11, 0x00, 0x00, 0x00, 0x1E]);
        body.extend_from_slice(&[0x11, 0x00, 0x00, 0x00, 0x3C]);
        body.extend_from_slice(&[0x00, 0x0A]);
        body.extend_from_slice(b"testClient");
        body.extend_from_slice(&[0x00, 0x08]);
        body.extend_from_slice(b"testUser");

        let err = decode_connect(&body).unwrap_err();
        assert!(matches!(err, DecodeError::Protocol(_)), "{:?}", err);
    }

    #[test]
    fn test_decode_connect_trailing_bytes() {
        let mut body = CONNECT_PACKET[2..].to_vec();
        body.push(0xFF);
        let err = decode_connect(&body).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)), "{:?}", err);
    }

    /// Build a minimal CONNECT body whose payload sections match the
    /// given flag byte.
    fn connect_body_for_flags(flags: u8) -> Vec<u8> {
        let mut body = vec![0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, flags, 0x00, 0x3C];
        body.push(0x00); // empty connect properties
        body.extend_from_slice(&[0x00, 0x03, b'c', b'i', b'd']);
        if flags & 0x04 != 0 {
            body.push(0x00); // empty will properties
            body.extend_from_slice(&[0x00, 0x01, b't']); // will topic
            body.extend_from_slice(&[0x00, 0x00]); // empty will payload
        }
        if flags & 0x80 != 0 {
            body.extend_from_slice(&[0x00, 0x01, b'u']);
        }
        if flags & 0x40 != 0 {
            body.extend_from_slice(&[0x00, 0x00]);
        }
        body
    }

    #[test]
    fn test_connect_flag_acceptance() {
        for flags in 0u16..=255 {
            let flags = flags as u8;
            let accepted = decode_connect(&connect_body_for_flags(flags)).is_ok();

            let reserved = flags & 0x01 != 0;
            let will = flags & 0x04 != 0;
            let will_qos = (flags >> 3) & 0x03;
            let expected = !reserved && will_qos <= 2 && (will || will_qos == 0);

            assert_eq!(accepted, expected, "flags {:#010b}", flags);
        }
    }

    #[test]
    fn test_decode_connect_with_will() {
        // Will flag + will QoS 1 + will retain
        let flags = 0x04 | (1 << 3) | 0x20;
        let connect = decode_connect(&connect_body_for_flags(flags)).unwrap();
        let will = connect.will.unwrap();
        assert_eq!(will.topic, "t");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
        assert!(will.payload.is_empty());
    }

    #[test]
    fn test_decode_publish_qos0() {
        // topic "a/b", empty properties, payload "hi"
        let body = [
            0x00, 0x03, b'a', b'/', b'b', 0x00, b'h', b'i',
        ];
        let publish = decode_publish(0x00, &body).unwrap();
        assert_eq!(publish.topic, "a/b");
        assert_eq!(publish.qos, QoS::AtMostOnce);
        assert!(publish.packet_id.is_none());
        assert!(!publish.dup);
        assert!(!publish.retain);
        assert_eq!(&publish.payload[..], b"hi");
    }

    #[test]
    fn test_decode_publish_qos1_packet_id() {
        let body = [
            0x00, 0x01, b't', 0x12, 0x34, 0x00, b'x',
        ];
        let publish = decode_publish(0x0B, &body).unwrap();
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert_eq!(publish.packet_id, Some(0x1234));
        assert!(publish.dup);
        assert!(publish.retain);
        assert_eq!(&publish.payload[..], b"x");
    }

    #[test]
    fn test_decode_publish_qos3_rejected() {
        let body = [0x00, 0x01, b't', 0x00];
        assert!(decode_publish(0x06, &body).is_err());
    }

    #[test]
    fn test_decode_disconnect() {
        assert_eq!(decode_disconnect(&[]).unwrap(), 0x00);
        assert_eq!(decode_disconnect(&[0x04]).unwrap(), 0x04);
        assert_eq!(decode_disconnect(&[0x00, 0x00]).unwrap(), 0x00);
    }

    #[test]
    fn test_encode_connack_success() {
        let connack = Connack {
            session_present: false,
            reason_code: reason_code::SUCCESS,
            properties: ConnackProperties {
                retain_available: Some(false),
                wildcard_subscription_available: Some(false),
                subscription_identifiers_available: Some(false),
                shared_subscription_available: Some(false),
                ..Default::default()
            },
        };
        let mut buf = Vec::new();
        encode_connack(&connack, &mut buf);
        assert_eq!(
            buf,
            [
                0x20, 0x0B, 0x00, 0x00, 0x08, 0x25, 0x00, 0x28, 0x00, 0x29, 0x00, 0x2A,
                0x00
            ]
        );
    }

    #[test]
    fn test_encode_disconnect() {
        let mut buf = Vec::new();
        encode_disconnect(reason_code::NORMAL_DISCONNECTION, &mut buf);
        assert_eq!(buf, [0xE0, 0x00]);

        buf.clear();
        encode_disconnect(reason_code::MALFORMED_PACKET, &mut buf);
        assert_eq!(buf, [0xE0, 0x01, 0x81]);
    }

    #[test]
    fn test_encode_pingresp() {
        let mut buf = Vec::new();
        encode_pingresp(&mut buf);
        assert_eq!(buf, [0xD0, 0x00]);
    }
}
