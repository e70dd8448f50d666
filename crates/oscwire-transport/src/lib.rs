//! oscwire transport layer
//!
//! Blocking packet transports consumed by the server loop:
//! - [`Transport`] trait (receive-with-timeout, send)
//! - UDP ([`UdpTransport`])
//! - OSC 1.0 stream framing for byte-stream transports ([`framing`])
//! - OSC endpoint URLs ([`OscUrl`])

pub mod error;
pub mod framing;
pub mod traits;
pub mod url;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use framing::FrameDecoder;
pub use traits::{Datagram, Transport};
pub use url::{OscUrl, Protocol};

#[cfg(feature = "udp")]
pub use udp::{UdpConfig, UdpTransport};
