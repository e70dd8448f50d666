//! UDP Transport Tests (oscwire-transport)
//!
//! Tests for the UDP transport implementation including:
//! - Binding and local address
//! - Send/receive of encoded OSC packets
//! - Sharing one transport across threads

use oscwire_core::{Bundle, Message, Packet, TimeTag};
use oscwire_transport::udp::{UdpConfig, UdpTransport};
use oscwire_transport::{Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Basic Binding Tests
// ============================================================================

#[test]
fn test_udp_bind_default() {
    let transport = UdpTransport::bind("127.0.0.1:0").expect("Bind should succeed");
    let addr = transport.local_addr().expect("Should get local address");
    assert!(addr.port() > 0, "Port should be > 0");
    assert_eq!(transport.max_packet_size(), 65507);
}

#[test]
fn test_udp_reuse_address() {
    let first = UdpTransport::bind("127.0.0.1:0").unwrap();
    let port = first.local_addr().unwrap().port();
    drop(first);

    let again = UdpTransport::bind(&format!("127.0.0.1:{}", port))
        .expect("Rebinding a released port should succeed");
    assert_eq!(again.local_addr().unwrap().port(), port);
}

// ============================================================================
// Send/Receive Tests
// ============================================================================

#[test]
fn test_udp_send_receive_packet() {
    let server = UdpTransport::bind("127.0.0.1:0").unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").unwrap();

    let msg = Message::new("/test/udp").unwrap().arg(42).arg("hello");
    let bytes = msg.encode().unwrap();
    client.send_to(&bytes, server.local_addr().unwrap()).unwrap();

    let datagram = server
        .recv_timeout(WAIT)
        .unwrap()
        .expect("Should receive a datagram");
    assert_eq!(datagram.source, client.local_addr());
    assert_eq!(Packet::decode(&datagram.data).unwrap(), Packet::Message(msg));
}

#[test]
fn test_udp_bundle_arrives_whole() {
    let server = UdpTransport::bind("127.0.0.1:0").unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").unwrap();

    let bundle = Bundle::new(TimeTag::new(4_000_000_000, 0))
        .with(Message::new("/a").unwrap().arg(1))
        .with(Message::new("/b").unwrap().arg(vec![0u8; 1000]));
    let bytes = bundle.encode().unwrap();
    client.send_to(&bytes, server.local_addr().unwrap()).unwrap();

    let datagram = server.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(datagram.data.len(), bytes.len());
    assert_eq!(Packet::decode(&datagram.data).unwrap(), Packet::Bundle(bundle));
}

#[test]
fn test_udp_oversized_datagram_rejected_on_receive() {
    let config = UdpConfig {
        max_packet_size: 64,
        ..UdpConfig::default()
    };
    let server = UdpTransport::bind_with_config("127.0.0.1:0", config).unwrap();
    let client = UdpTransport::bind("127.0.0.1:0").unwrap();

    client.send_to(&[0u8; 128], server.local_addr().unwrap()).unwrap();
    let err = server.recv_timeout(WAIT).unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge { max: 64, .. }));
}

#[test]
fn test_udp_shared_across_threads() {
    let server = Arc::new(UdpTransport::bind("127.0.0.1:0").unwrap());
    let target = server.local_addr().unwrap();

    let senders: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let client = UdpTransport::bind("127.0.0.1:0").unwrap();
                let msg = Message::new(format!("/thread/{}", i)).unwrap();
                client.send_to(&msg.encode().unwrap(), target).unwrap();
            })
        })
        .collect();
    for handle in senders {
        handle.join().unwrap();
    }

    let mut paths = Vec::new();
    while paths.len() < 4 {
        let datagram = server.recv_timeout(WAIT).unwrap().expect("datagram");
        match Packet::decode(&datagram.data).unwrap() {
            Packet::Message(m) => paths.push(m.path().to_string()),
            Packet::Bundle(_) => panic!("Expected message"),
        }
    }
    paths.sort();
    assert_eq!(paths, ["/thread/0", "/thread/1", "/thread/2", "/thread/3"]);
}
