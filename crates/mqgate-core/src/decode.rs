//! Positional cursor over a packet body.
//!
//! All multi-byte integers on the wire are big-endian. Every read either
//! advances the cursor by exactly the encoded size or fails with a
//! malformed-packet error; decoded strings and blobs are copied out so
//! the request can outlive the read buffer.

use crate::error::{DecodeError, DecodeResult};
use crate::varint;

/// Decoder for MQTT packet bodies.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn short(&self, what: &str, needed: usize) -> DecodeError {
        DecodeError::Malformed(format!(
            "{}: need {} bytes, have {}",
            what,
            needed,
            self.remaining()
        ))
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        if self.is_empty() {
            return Err(self.short("byte", 1));
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        if self.remaining() < 2 {
            return Err(self.short("two byte integer", 2));
        }
        let val = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        if self.remaining() < 4 {
            return Err(self.short("four byte integer", 4));
        }
        let val = u32::from_be_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(val)
    }

    /// Byte boolean: only 0x00 and 0x01 are valid on the wire.
    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(DecodeError::Malformed(format!(
                "byte boolean must be 0 or 1, got {}",
                b
            ))),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.short("bytes", len));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// UTF-8 string: two-byte length prefix, then that many bytes of valid
    /// UTF-8. Embedded U+0000 is rejected (MQTT-1.5.3-2). Empty strings
    /// are valid.
    pub fn read_string(&mut self) -> DecodeResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        if bytes.contains(&0u8) {
            return Err(DecodeError::Malformed(
                "UTF-8 string must not contain null character".into(),
            ));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::Malformed("invalid UTF-8 string".into()))
    }

    /// Binary data: two-byte length prefix, then opaque bytes.
    pub fn read_binary(&mut self) -> DecodeResult<Vec<u8>> {
        let len = self.read_u16()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Two consecutive UTF-8 strings.
    pub fn read_string_pair(&mut self) -> DecodeResult<(String, String)> {
        let key = self.read_string()?;
        let value = self.read_string()?;
        Ok((key, value))
    }

    /// Variable Byte Integer; a truncated encoding is malformed here since
    /// the body buffer is complete.
    pub fn read_variable_byte_integer(&mut self) -> DecodeResult<u32> {
        match varint::decode(&self.buf[self.pos..])? {
            Some((value, consumed)) => {
                self.pos += consumed;
                Ok(value)
            }
            None => Err(DecodeError::Malformed(
                "truncated variable byte integer".into(),
            )),
        }
    }

    /// Consume and return all remaining bytes.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}
