//! Outbound packets over a shared transport

use oscwire_core::{Bundle, Message, Packet};
use oscwire_transport::{OscUrl, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::trace;

use crate::error::Result;

/// Encodes packets and sends them to one default target.
///
/// Sending validates before encoding: message paths must be concrete
/// addresses, not patterns, and the encoded packet must fit the
/// transport's size limit.
#[derive(Clone)]
pub struct OscSender {
    transport: Arc<dyn Transport>,
    target: SocketAddr,
    max_packet_size: usize,
}

impl OscSender {
    pub fn new(transport: Arc<dyn Transport>, target: SocketAddr) -> Self {
        let max_packet_size = transport.max_packet_size();
        Self {
            transport,
            target,
            max_packet_size,
        }
    }

    /// Target taken from an `osc.udp://host:port/` style URL
    pub fn from_url(transport: Arc<dyn Transport>, url: &str) -> Result<Self> {
        let target = OscUrl::parse(url)?.socket_addr()?;
        Ok(Self::new(transport, target))
    }

    /// Lower the size limit below the transport's own
    pub fn with_max_packet_size(mut self, max: usize) -> Self {
        self.max_packet_size = max.min(self.transport.max_packet_size());
        self
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn send_message(&self, msg: &Message) -> Result<()> {
        msg.validate_target()?;
        self.send_unchecked(&Packet::Message(msg.clone()), self.target)
    }

    pub fn send_bundle(&self, bundle: &Bundle) -> Result<()> {
        validate_bundle(bundle)?;
        self.send_unchecked(&Packet::Bundle(bundle.clone()), self.target)
    }

    pub fn send(&self, packet: &Packet) -> Result<()> {
        self.send_to(packet, self.target)
    }

    /// Send to an address other than the default target, e.g. a reply to
    /// a message's source
    pub fn send_to(&self, packet: &Packet, addr: SocketAddr) -> Result<()> {
        match packet {
            Packet::Message(msg) => msg.validate_target()?,
            Packet::Bundle(bundle) => validate_bundle(bundle)?,
        }
        self.send_unchecked(packet, addr)
    }

    fn send_unchecked(&self, packet: &Packet, addr: SocketAddr) -> Result<()> {
        let bytes = packet.encode_with_limit(self.max_packet_size)?;
        trace!("Sending {} bytes to {}", bytes.len(), addr);
        self.transport.send_to(&bytes, addr)?;
        Ok(())
    }
}

impl std::fmt::Debug for OscSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscSender")
            .field("target", &self.target)
            .field("max_packet_size", &self.max_packet_size)
            .finish_non_exhaustive()
    }
}

fn validate_bundle(bundle: &Bundle) -> oscwire_core::Result<()> {
    let mut result = Ok(());
    bundle.for_each_message(|msg| {
        if result.is_ok() {
            result = msg.validate_target();
        }
    });
    result
}
