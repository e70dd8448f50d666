//! UDP transport implementation

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind as IoErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::{Datagram, Transport};

/// Largest payload a UDP datagram can carry over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Maximum packet size, in either direction
    pub max_packet_size: usize,
    /// Set SO_REUSEADDR before binding
    pub reuse_address: bool,
    /// Allow sending to broadcast addresses
    pub broadcast: bool,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_UDP_PAYLOAD,
            reuse_address: true,
            broadcast: false,
        }
    }
}

/// Blocking UDP transport
pub struct UdpTransport {
    socket: UdpSocket,
    config: UdpConfig,
    // One extra byte so an oversized datagram is detectable
    recv_buf: Mutex<Vec<u8>>,
    read_timeout: Mutex<Option<Duration>>,
}

impl UdpTransport {
    /// Bind to a local address
    pub fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default())
    }

    /// Bind with config
    pub fn bind_with_config(addr: &str, config: UdpConfig) -> Result<Self> {
        let bind_addr = resolve(addr)?;
        let bind_failed = |source| TransportError::BindFailed {
            addr: addr.to_string(),
            source,
        };

        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(bind_failed)?;
        if config.reuse_address {
            socket.set_reuse_address(true).map_err(bind_failed)?;
        }
        if config.broadcast {
            socket.set_broadcast(true).map_err(bind_failed)?;
        }
        socket.bind(&bind_addr.into()).map_err(bind_failed)?;

        let socket: UdpSocket = socket.into();
        let local = socket.local_addr()?;
        info!("UDP bound to {}", local);

        Ok(Self {
            socket,
            recv_buf: Mutex::new(vec![0u8; config.max_packet_size + 1]),
            read_timeout: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Enable broadcast
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        self.socket.set_broadcast(enable).map_err(TransportError::Io)
    }

    fn apply_read_timeout(&self, timeout: Duration) -> Result<()> {
        // A zero timeout means "block forever" to the OS
        let timeout = timeout.max(Duration::from_millis(1));
        let mut current = self.read_timeout.lock();
        if *current != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            *current = Some(timeout);
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>> {
        self.apply_read_timeout(timeout)?;

        let mut buf = self.recv_buf.lock();
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if len > self.config.max_packet_size {
                    return Err(TransportError::FrameTooLarge {
                        size: len,
                        max: self.config.max_packet_size,
                    });
                }
                trace!("UDP received {} bytes from {}", len, from);
                Ok(Some(Datagram::new(
                    Bytes::copy_from_slice(&buf[..len]),
                    Some(from),
                )))
            }
            Err(e) if matches!(e.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut) => {
                Ok(None)
            }
            // ICMP port unreachable from an earlier send surfaces here on some platforms
            Err(e) if e.kind() == IoErrorKind::ConnectionReset => {
                debug!("UDP ignoring connection reset: {}", e);
                Ok(None)
            }
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        if data.len() > self.config.max_packet_size {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                max: self.config.max_packet_size,
            });
        }
        self.socket
            .send_to(data, target)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        trace!("UDP sent {} bytes to {}", data.len(), target);
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    fn max_packet_size(&self) -> usize {
        self.config.max_packet_size
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| TransportError::InvalidUrl(format!("{} resolved to no address", addr)))
}
