//! Transport trait definitions

use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;

/// One received packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub data: Bytes,
    /// Sender address, when the transport knows it
    pub source: Option<SocketAddr>,
}

impl Datagram {
    pub fn new(data: impl Into<Bytes>, source: Option<SocketAddr>) -> Self {
        Self {
            data: data.into(),
            source,
        }
    }
}

/// Packet transport consumed by the server loop and senders
///
/// Methods take `&self` so one transport can be shared between a receive
/// loop and any number of senders.
pub trait Transport: Send + Sync {
    /// Block for up to `timeout` waiting for one packet.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing received.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>>;

    /// Send one packet to `target`
    fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()>;

    /// Local bound address, if applicable
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Largest packet this transport can carry
    fn max_packet_size(&self) -> usize {
        oscwire_core::DEFAULT_MAX_PACKET_SIZE
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>> {
        (**self).recv_timeout(timeout)
    }

    fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        (**self).send_to(data, target)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        (**self).local_addr()
    }

    fn max_packet_size(&self) -> usize {
        (**self).max_packet_size()
    }
}
