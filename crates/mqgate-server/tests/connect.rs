//! End-to-end tests driving a bound server over real TCP.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mqgate_server::config::Config;
use mqgate_server::server::Server;

/// CONNECT with client id `testClient`, username `testUser`, session
/// expiry 30s, keep alive 30s.
const CONNECT_PACKET: [u8; 40] = [
    0x10, 0x26, 0x00, 0x04, 0x4D, 0x51, 0x54, 0x54, 0x05, 0x80, 0x00, 0x1E, 0x05, 0x11, 0x00,
    0x00, 0x00, 0x1E, 0x00, 0x0A, 0x74, 0x65, 0x73, 0x74, 0x43, 0x6C, 0x69, 0x65, 0x6E, 0x74,
    0x00, 0x08, 0x74, 0x65, 0x73, 0x74, 0x55, 0x73, 0x65, 0x72,
];

/// Session present 0, reason Success, and the four disabled-capability
/// properties.
const EXPECTED_CONNACK: [u8; 13] = [
    0x20, 0x0B, 0x00, 0x00, 0x08, 0x25, 0x00, 0x28, 0x00, 0x29, 0x00, 0x2A, 0x00,
];

fn start_server() -> SocketAddr {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1:0".parse().unwrap();

    let server = Server::bind(Arc::new(config)).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });
    addr
}

fn connect_client(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn handshake(stream: &mut TcpStream) {
    stream.write_all(&CONNECT_PACKET).unwrap();
    let mut connack = [0u8; 13];
    stream.read_exact(&mut connack).unwrap();
    assert_eq!(connack, EXPECTED_CONNACK);
}

#[test]
fn connect_handshake_returns_golden_connack() {
    let addr = start_server();
    let mut stream = connect_client(addr);
    handshake(&mut stream);
}

#[test]
fn pingreq_gets_pingresp() {
    let addr = start_server();
    let mut stream = connect_client(addr);
    handshake(&mut stream);

    stream.write_all(&[0xC0, 0x00]).unwrap();
    let mut pingresp = [0u8; 2];
    stream.read_exact(&mut pingresp).unwrap();
    assert_eq!(pingresp, [0xD0, 0x00]);
}

#[test]
fn qos0_publish_produces_no_response() {
    let addr = start_server();
    let mut stream = connect_client(addr);
    handshake(&mut stream);

    // PUBLISH topic "a", no properties, payload "hi"
    stream
        .write_all(&[0x30, 0x06, 0x00, 0x01, b'a', 0x00, b'h', b'i'])
        .unwrap();

    // A PINGREQ right behind it must be answered with PINGRESP and
    // nothing in between.
    stream.write_all(&[0xC0, 0x00]).unwrap();
    let mut pingresp = [0u8; 2];
    stream.read_exact(&mut pingresp).unwrap();
    assert_eq!(pingresp, [0xD0, 0x00]);
}

#[test]
fn unsupported_packet_closes_with_disconnect() {
    let addr = start_server();
    let mut stream = connect_client(addr);
    handshake(&mut stream);

    // SUBSCRIBE (type 8, flags 0x02) is not decoded by this core
    stream.write_all(&[0x82, 0x00]).unwrap();
    let mut disconnect = [0u8; 3];
    stream.read_exact(&mut disconnect).unwrap();
    assert_eq!(disconnect, [0xE0, 0x01, 0x82]);

    let mut rest = [0u8; 1];
    assert_eq!(stream.read(&mut rest).unwrap(), 0, "connection must close");
}

#[test]
fn reserved_packet_type_closes_connection() {
    let addr = start_server();
    let mut stream = connect_client(addr);

    stream.write_all(&[0x00, 0x00]).unwrap();
    let mut disconnect = [0u8; 3];
    stream.read_exact(&mut disconnect).unwrap();
    assert_eq!(disconnect, [0xE0, 0x01, 0x81]);

    let mut rest = [0u8; 1];
    assert_eq!(stream.read(&mut rest).unwrap(), 0, "connection must close");
}

#[test]
fn bad_protocol_name_gets_version_rejection() {
    let addr = start_server();
    let mut stream = connect_client(addr);

    // `MQTU` in the protocol name preamble
    let mut packet = CONNECT_PACKET;
    packet[7] = b'U';
    stream.write_all(&packet).unwrap();

    // CONNACK: session 0, reason 0x84, empty properties, then close
    let mut connack = [0u8; 5];
    stream.read_exact(&mut connack).unwrap();
    assert_eq!(connack, [0x20, 0x03, 0x00, 0x84, 0x00]);

    let mut rest = [0u8; 1];
    assert_eq!(stream.read(&mut rest).unwrap(), 0, "connection must close");
}

#[test]
fn orderly_disconnect_closes_without_response() {
    let addr = start_server();
    let mut stream = connect_client(addr);
    handshake(&mut stream);

    stream.write_all(&[0xE0, 0x00]).unwrap();
    let mut rest = [0u8; 1];
    assert_eq!(stream.read(&mut rest).unwrap(), 0, "connection must close");
}

#[test]
fn half_header_then_close_is_tolerated() {
    let addr = start_server();
    let mut stream = connect_client(addr);

    // One byte of a fixed header, then drop the connection. The server
    // must not respond.
    stream.write_all(&[0x10]).unwrap();
    drop(stream);

    // The listener must still serve new connections afterwards.
    let mut stream = connect_client(addr);
    handshake(&mut stream);
}

#[test]
fn keep_alive_watchdog_closes_idle_connection() {
    let addr = start_server();
    let mut stream = connect_client(addr);

    // CONNECT with keep alive of 1 second; the watchdog fires at 1.5s.
    let mut packet = CONNECT_PACKET.to_vec();
    packet[10] = 0x00;
    packet[11] = 0x01;
    stream.write_all(&packet).unwrap();
    let mut connack = [0u8; 13];
    stream.read_exact(&mut connack).unwrap();
    assert_eq!(connack, EXPECTED_CONNACK);

    // Stay silent past the deadline; the server must drop the stream.
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let mut rest = [0u8; 1];
    match stream.read(&mut rest) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {} bytes from idle connection", n),
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted),
            "unexpected error: {}",
            e
        ),
    }
}
