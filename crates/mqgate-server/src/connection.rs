//! Per-connection read loop.
//!
//! Each connection runs this state machine to completion on its own
//! thread: read the fixed header, read exactly the declared body, decode,
//! write the response, repeat. Any decode error closes the connection
//! after a final reason-coded packet (CONNACK while handling CONNECT,
//! DISCONNECT otherwise); transport errors close it silently.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};

use mqgate_core::packet::{
    decode_connect, decode_disconnect, decode_publish, encode_connack, encode_disconnect,
    encode_pingresp, reason_code, FixedHeader, PacketType,
};
use mqgate_core::{varint, DecodeError, Decoder, Error, Result};

use crate::config::Config;
use crate::handlers::{connect as connect_handler, publish as publish_handler};

/// Grace multiplier applied to the advertised keep-alive: the watchdog
/// fires after 1.5x the interval with no packet.
const KEEP_ALIVE_GRACE_MS: u64 = 1500;

/// A single client connection and its read loop state.
pub struct Connection {
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: Arc<Config>,
    /// Set once a CONNECT has been accepted.
    client_id: Option<String>,
}

impl Connection {
    pub fn new(stream: TcpStream, remote_addr: SocketAddr, config: Arc<Config>) -> Self {
        Self {
            stream,
            remote_addr,
            config,
            client_id: None,
        }
    }

    /// Drive the connection until it closes. The TCP stream is shut down
    /// on the way out regardless of how the loop ended.
    pub fn run(&mut self) -> Result<()> {
        let result = self.serve();
        let _ = self.stream.shutdown(Shutdown::Both);
        result
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            let header = match self.read_header() {
                Ok(header) => header,
                Err(Error::Decode(e)) => {
                    self.send_final_disconnect(e.reason_code());
                    return Err(e.into());
                }
                Err(e) => return Err(e),
            };
            trace!(
                "{}: {:?} flags {:#06b} body {}B",
                self.remote_addr,
                header.packet_type,
                header.flags,
                header.remaining_len
            );

            if let Err(e) = header.validate_flags() {
                self.send_final_disconnect(e.reason_code());
                return Err(e.into());
            }

            if header.remaining_len > self.config.limits.max_packet_size as usize {
                self.send_final_disconnect(reason_code::PACKET_TOO_LARGE);
                return Err(DecodeError::Malformed(format!(
                    "packet body of {} bytes exceeds limit",
                    header.remaining_len
                ))
                .into());
            }

            let mut body = vec![0u8; header.remaining_len];
            self.stream.read_exact(&mut body)?;

            match self.dispatch(&header, &body) {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(Error::Decode(e)) => {
                    if header.packet_type == PacketType::Connect {
                        self.send_final_connack(e.reason_code());
                    } else {
                        self.send_final_disconnect(e.reason_code());
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the control byte and the remaining-length VBI from the
    /// stream: two bytes first, then one byte at a time while the
    /// continuation bit is set.
    fn read_header(&mut self) -> Result<FixedHeader> {
        let mut buf = [0u8; 1 + varint::MAX_ENCODED_LEN];
        self.stream.read_exact(&mut buf[..2])?;

        let mut len = 2;
        while buf[len - 1] & 0x80 != 0 && len < buf.len() {
            self.stream.read_exact(&mut buf[len..len + 1])?;
            len += 1;
        }

        Ok(FixedHeader::parse(&mut Decoder::new(&buf[..len]))?)
    }

    /// Decode the packet and write its response. Returns false when the
    /// connection should close in an orderly fashion.
    fn dispatch(&mut self, header: &FixedHeader, body: &[u8]) -> Result<bool> {
        match header.packet_type {
            PacketType::Connect => {
                let connect = decode_connect(body)?;
                // No session store: session-present is always 0.
                let connack =
                    connect_handler::build_connack(&connect, &self.config.mqtt, false);

                let mut buf = Vec::new();
                encode_connack(&connack, &mut buf);
                self.stream.write_all(&buf)?;

                if connack.reason_code != reason_code::SUCCESS {
                    info!(
                        "rejected CONNECT from {} (reason {:#04x})",
                        self.remote_addr, connack.reason_code
                    );
                    return Ok(false);
                }

                info!(
                    "client '{}' connected from {} (keep alive {}s)",
                    connect.client_id, self.remote_addr, connect.keep_alive
                );
                self.arm_keep_alive(connect.keep_alive)?;
                self.client_id = Some(connect.client_id);
                Ok(true)
            }
            PacketType::Publish => {
                let publish = decode_publish(header.flags, body)?;
                publish_handler::handle_publish(self.client_id.as_deref(), &publish);
                Ok(true)
            }
            PacketType::Pingreq => {
                let mut buf = Vec::new();
                encode_pingresp(&mut buf);
                self.stream.write_all(&buf)?;
                Ok(true)
            }
            PacketType::Disconnect => {
                let rc = decode_disconnect(body)?;
                debug!(
                    "client {:?} from {} disconnected (reason {:#04x})",
                    self.client_id, self.remote_addr, rc
                );
                Ok(false)
            }
            other => Err(DecodeError::UnsupportedPacket(other).into()),
        }
    }

    /// Arm the idle watchdog at 1.5x the advertised keep-alive. A zero
    /// keep-alive disables it.
    fn arm_keep_alive(&mut self, keep_alive: u16) -> Result<()> {
        let timeout = if keep_alive == 0 {
            None
        } else {
            Some(Duration::from_millis(
                u64::from(keep_alive) * KEEP_ALIVE_GRACE_MS,
            ))
        };
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Best-effort final CONNACK carrying the rejection reason code.
    fn send_final_connack(&mut self, rc: u8) {
        let connack = connect_handler::build_error_connack(rc);
        let mut buf = Vec::new();
        encode_connack(&connack, &mut buf);
        if let Err(e) = self.stream.write_all(&buf) {
            trace!("{}: error CONNACK not delivered: {}", self.remote_addr, e);
        }
    }

    /// Best-effort final DISCONNECT carrying the reason code.
    fn send_final_disconnect(&mut self, rc: u8) {
        let mut buf = Vec::new();
        encode_disconnect(rc, &mut buf);
        if let Err(e) = self.stream.write_all(&buf) {
            trace!("{}: DISCONNECT not delivered: {}", self.remote_addr, e);
        }
    }
}
