//! mqgate-core - MQTT v5 packet types and codec.
//!
//! This crate provides the wire-level building blocks for the mqgate
//! broker front end: the positional byte cursor, the Variable Byte
//! Integer codec, the property codec, and the packet decoders/encoders
//! for the packets the server handles.

pub mod decode;
pub mod error;
pub mod packet;
pub mod properties;
pub mod varint;

pub use decode::Decoder;
pub use error::{DecodeError, Error, Result};
pub use packet::*;
pub use properties::{
    ConnackProperties, ConnectProperties, PublishProperties, WillProperties,
};
