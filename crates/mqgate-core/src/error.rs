//! Error types for packet decoding and connection handling.

use std::io;

use thiserror::Error;

use crate::packet::reason_code;

/// Decode error. Each variant corresponds to a class of packet rejection
/// and maps to the reason code carried in a final CONNACK or DISCONNECT.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Framing or primitive-level violation: short buffer, invalid UTF-8,
    /// oversized Variable Byte Integer, bad byte boolean, reserved bits,
    /// leftover bytes after a payload.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Structurally well-formed but semantically illegal, e.g. a duplicate
    /// non-repeatable property.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Protocol name or version other than MQTT 5.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    /// A control packet type this server does not decode.
    #[error("unsupported packet type: {0:?}")]
    UnsupportedPacket(crate::packet::PacketType),
}

impl DecodeError {
    /// Reason code to carry in the final CONNACK or DISCONNECT.
    pub fn reason_code(&self) -> u8 {
        match self {
            DecodeError::Malformed(_) => reason_code::MALFORMED_PACKET,
            DecodeError::Protocol(_) => reason_code::PROTOCOL_ERROR,
            DecodeError::UnsupportedProtocolVersion(_) => {
                reason_code::UNSUPPORTED_PROTOCOL_VERSION
            }
            DecodeError::UnsupportedPacket(_) => reason_code::PROTOCOL_ERROR,
        }
    }
}

/// Top-level error type: a decode rejection or a transport failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Result alias for pure decode paths.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
