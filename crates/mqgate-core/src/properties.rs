//! MQTT v5 property blocks.
//!
//! A property block is a VBI length followed by `identifier byte | typed
//! value` entries. Which identifiers are permitted depends on the
//! enclosing packet; each block decoder below is the dispatch table for
//! its packet type. A block must be consumed exactly: the decoder works
//! on a bounded sub-cursor of the declared length, so a value running
//! past the block fails as malformed. Every identifier except
//! user-property (0x26) may appear at most once per block; a repeat is a
//! protocol error.

use crate::decode::Decoder;
use crate::error::{DecodeError, DecodeResult};
use crate::varint;

/// Property identifiers (MQTT v5 §2.2.2.2).
pub mod property {
    pub const PAYLOAD_FORMAT_INDICATOR: u8 = 0x01;
    pub const MESSAGE_EXPIRY_INTERVAL: u8 = 0x02;
    pub const CONTENT_TYPE: u8 = 0x03;
    pub const RESPONSE_TOPIC: u8 = 0x08;
    pub const CORRELATION_DATA: u8 = 0x09;
    pub const SUBSCRIPTION_IDENTIFIER: u8 = 0x0B;
    pub const SESSION_EXPIRY_INTERVAL: u8 = 0x11;
    pub const AUTHENTICATION_METHOD: u8 = 0x15;
    pub const AUTHENTICATION_DATA: u8 = 0x16;
    pub const REQUEST_PROBLEM_INFORMATION: u8 = 0x17;
    pub const WILL_DELAY_INTERVAL: u8 = 0x18;
    pub const REQUEST_RESPONSE_INFORMATION: u8 = 0x19;
    pub const RECEIVE_MAXIMUM: u8 = 0x21;
    pub const TOPIC_ALIAS_MAXIMUM: u8 = 0x22;
    pub const TOPIC_ALIAS: u8 = 0x23;
    pub const MAXIMUM_QOS: u8 = 0x24;
    pub const RETAIN_AVAILABLE: u8 = 0x25;
    pub const USER_PROPERTY: u8 = 0x26;
    pub const MAXIMUM_PACKET_SIZE: u8 = 0x27;
    pub const WILDCARD_SUBSCRIPTION_AVAILABLE: u8 = 0x28;
    pub const SUBSCRIPTION_IDENTIFIERS_AVAILABLE: u8 = 0x29;
    pub const SHARED_SUBSCRIPTION_AVAILABLE: u8 = 0x2A;
}

/// Tracks which identifiers were already seen in a block. Identifiers fit
/// in 6 bits, so a u64 bitmask covers the whole space.
struct SeenSet(u64);

impl SeenSet {
    fn new() -> Self {
        SeenSet(0)
    }

    /// Record `id`; returns false if it was already present.
    fn insert(&mut self, id: u8) -> bool {
        let bit = 1u64 << (id & 0x3F);
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }
}

/// Read the block length and hand back a cursor bounded to exactly that
/// many bytes.
fn property_block<'a>(dec: &mut Decoder<'a>) -> DecodeResult<Decoder<'a>> {
    let len = dec.read_variable_byte_integer()? as usize;
    let bytes = dec
        .read_bytes(len)
        .map_err(|_| DecodeError::Malformed("property block length exceeds body".into()))?;
    Ok(Decoder::new(bytes))
}

/// Read the next identifier, enforcing the no-duplicates rule.
fn next_property(block: &mut Decoder<'_>, seen: &mut SeenSet) -> DecodeResult<u8> {
    let id = block.read_u8()?;
    if !seen.insert(id) && id != property::USER_PROPERTY {
        return Err(DecodeError::Protocol(format!(
            "duplicate property 0x{:02x}",
            id
        )));
    }
    Ok(id)
}

fn not_permitted(packet: &str, id: u8) -> DecodeError {
    DecodeError::Malformed(format!("property 0x{:02x} not permitted in {}", id, packet))
}

/// CONNECT properties. Defaults are in place before decoding; a set
/// property overrides its default.
#[derive(Debug, Clone)]
pub struct ConnectProperties {
    /// Session expiry interval in seconds.
    pub session_expiry_interval: u32,
    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub topic_alias_maximum: u16,
    pub request_response_info: bool,
    pub request_problem_info: bool,
    pub user_properties: Vec<(String, String)>,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Vec<u8>>,
}

impl Default for ConnectProperties {
    fn default() -> Self {
        Self {
            session_expiry_interval: 0,
            receive_maximum: u16::MAX,
            maximum_packet_size: u32::MAX,
            topic_alias_maximum: 0,
            request_response_info: false,
            request_problem_info: true,
            user_properties: Vec::new(),
            authentication_method: None,
            authentication_data: None,
        }
    }
}

impl ConnectProperties {
    pub fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let mut props = Self::default();
        let mut block = property_block(dec)?;
        let mut seen = SeenSet::new();

        while !block.is_empty() {
            match next_property(&mut block, &mut seen)? {
                property::SESSION_EXPIRY_INTERVAL => {
                    props.session_expiry_interval = block.read_u32()?;
                }
                property::RECEIVE_MAXIMUM => {
                    props.receive_maximum = block.read_u16()?;
                    if props.receive_maximum == 0 {
                        return Err(DecodeError::Protocol(
                            "receive maximum must be nonzero".into(),
                        ));
                    }
                }
                property::MAXIMUM_PACKET_SIZE => {
                    props.maximum_packet_size = block.read_u32()?;
                    if props.maximum_packet_size == 0 {
                        return Err(DecodeError::Protocol(
                            "maximum packet size must be nonzero".into(),
                        ));
                    }
                }
                property::TOPIC_ALIAS_MAXIMUM => {
                    props.topic_alias_maximum = block.read_u16()?;
                }
                property::REQUEST_RESPONSE_INFORMATION => {
                    props.request_response_info = block.read_bool()?;
                }
                property::REQUEST_PROBLEM_INFORMATION => {
                    props.request_problem_info = block.read_bool()?;
                }
                property::USER_PROPERTY => {
                    props.user_properties.push(block.read_string_pair()?);
                }
                property::AUTHENTICATION_METHOD => {
                    props.authentication_method = Some(block.read_string()?);
                }
                property::AUTHENTICATION_DATA => {
                    props.authentication_data = Some(block.read_binary()?);
                }
                id => return Err(not_permitted("CONNECT", id)),
            }
        }

        Ok(props)
    }
}

/// Will properties carried in the CONNECT payload.
#[derive(Debug, Clone)]
pub struct WillProperties {
    /// Delay before the will is published, in seconds.
    pub will_delay_interval: u32,
    pub payload_format_indicator: bool,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub user_properties: Vec<(String, String)>,
}

impl Default for WillProperties {
    fn default() -> Self {
        Self {
            will_delay_interval: 0,
            payload_format_indicator: false,
            message_expiry_interval: None,
            content_type: None,
            response_topic: None,
            correlation_data: None,
            user_properties: Vec::new(),
        }
    }
}

impl WillProperties {
    pub fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let mut props = Self::default();
        let mut block = property_block(dec)?;
        let mut seen = SeenSet::new();

        while !block.is_empty() {
            match next_property(&mut block, &mut seen)? {
                property::WILL_DELAY_INTERVAL => {
                    props.will_delay_interval = block.read_u32()?;
                }
                property::PAYLOAD_FORMAT_INDICATOR => {
                    props.payload_format_indicator = block.read_bool()?;
                }
                property::MESSAGE_EXPIRY_INTERVAL => {
                    props.message_expiry_interval = Some(block.read_u32()?);
                }
                property::CONTENT_TYPE => {
                    props.content_type = Some(block.read_string()?);
                }
                property::RESPONSE_TOPIC => {
                    props.response_topic = Some(block.read_string()?);
                }
                property::CORRELATION_DATA => {
                    props.correlation_data = Some(block.read_binary()?);
                }
                property::USER_PROPERTY => {
                    props.user_properties.push(block.read_string_pair()?);
                }
                id => return Err(not_permitted("will properties", id)),
            }
        }

        Ok(props)
    }
}

/// PUBLISH properties.
#[derive(Debug, Clone, Default)]
pub struct PublishProperties {
    pub payload_format_indicator: bool,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub user_properties: Vec<(String, String)>,
    /// Always nonzero when present.
    pub subscription_identifier: Option<u32>,
    pub content_type: Option<String>,
}

impl PublishProperties {
    pub fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let mut props = Self::default();
        let mut block = property_block(dec)?;
        let mut seen = SeenSet::new();

        while !block.is_empty() {
            match next_property(&mut block, &mut seen)? {
                property::PAYLOAD_FORMAT_INDICATOR => {
                    props.payload_format_indicator = block.read_bool()?;
                }
                property::MESSAGE_EXPIRY_INTERVAL => {
                    props.message_expiry_interval = Some(block.read_u32()?);
                }
                property::TOPIC_ALIAS => {
                    props.topic_alias = Some(block.read_u16()?);
                }
                property::RESPONSE_TOPIC => {
                    props.response_topic = Some(block.read_string()?);
                }
                property::CORRELATION_DATA => {
                    props.correlation_data = Some(block.read_binary()?);
                }
                property::USER_PROPERTY => {
                    props.user_properties.push(block.read_string_pair()?);
                }
                property::SUBSCRIPTION_IDENTIFIER => {
                    let id = block.read_variable_byte_integer()?;
                    if id == 0 {
                        return Err(DecodeError::Malformed(
                            "subscription identifier must be nonzero".into(),
                        ));
                    }
                    props.subscription_identifier = Some(id);
                }
                property::CONTENT_TYPE => {
                    props.content_type = Some(block.read_string()?);
                }
                id => return Err(not_permitted("PUBLISH", id)),
            }
        }

        Ok(props)
    }
}

/// CONNACK properties. Only the capability advertisement is carried by
/// this server; unset fields are not emitted.
#[derive(Debug, Clone, Default)]
pub struct ConnackProperties {
    pub maximum_qos: Option<u8>,
    pub retain_available: Option<bool>,
    pub wildcard_subscription_available: Option<bool>,
    pub subscription_identifiers_available: Option<bool>,
    pub shared_subscription_available: Option<bool>,
}

impl ConnackProperties {
    /// Serialise set properties to a scratch buffer, then prepend the
    /// block length as a VBI.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut prop_buf = Vec::new();

        if let Some(v) = self.maximum_qos {
            prop_buf.push(property::MAXIMUM_QOS);
            prop_buf.push(v);
        }
        if let Some(v) = self.retain_available {
            prop_buf.push(property::RETAIN_AVAILABLE);
            prop_buf.push(v as u8);
        }
        if let Some(v) = self.wildcard_subscription_available {
            prop_buf.push(property::WILDCARD_SUBSCRIPTION_AVAILABLE);
            prop_buf.push(v as u8);
        }
        if let Some(v) = self.subscription_identifiers_available {
            prop_buf.push(property::SUBSCRIPTION_IDENTIFIERS_AVAILABLE);
            prop_buf.push(v as u8);
        }
        if let Some(v) = self.shared_subscription_available {
            prop_buf.push(property::SHARED_SUBSCRIPTION_AVAILABLE);
            prop_buf.push(v as u8);
        }

        varint::encode_to_vec(prop_buf.len() as u32, buf);
        buf.extend_from_slice(&prop_buf);
    }
}
