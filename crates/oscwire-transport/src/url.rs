//! OSC URLs: `osc.udp://host:port/`, `osc.tcp://host:port/`, `osc.unix:///path`

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{Result, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
    Unix,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Udp => "osc.udp://",
            Protocol::Tcp => "osc.tcp://",
            Protocol::Unix => "osc.unix://",
        }
    }
}

/// A parsed OSC endpoint URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OscUrl {
    pub protocol: Protocol,
    /// Host name or address; the socket path for `osc.unix`
    pub host: String,
    /// Always present for UDP and TCP, absent for Unix sockets
    pub port: Option<u16>,
}

impl OscUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| TransportError::InvalidUrl(format!("{}: {}", reason, url));

        let (protocol, rest) = [Protocol::Udp, Protocol::Tcp, Protocol::Unix]
            .into_iter()
            .find_map(|p| url.strip_prefix(p.scheme()).map(|rest| (p, rest)))
            .ok_or_else(|| invalid("expected osc.udp://, osc.tcp:// or osc.unix://"))?;

        if protocol == Protocol::Unix {
            if rest.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Self {
                protocol,
                host: rest.to_string(),
                port: None,
            });
        }

        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.strip_prefix('[') {
            // [v6addr]:port
            Some(v6) => {
                let (host, after) = v6.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
                let port = after.strip_prefix(':').ok_or_else(|| invalid("missing port"))?;
                (host, port)
            }
            None => authority
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port"))?,
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;

        Ok(Self {
            protocol,
            host: host.to_string(),
            port: Some(port),
        })
    }

    /// Resolve to a socket address. Unix socket URLs have none.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let port = self.port.ok_or_else(|| {
            TransportError::Unsupported(format!("{} has no socket address", self))
        })?;
        (self.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", self, e)))?
            .next()
            .ok_or_else(|| TransportError::InvalidUrl(format!("{} resolved to no address", self)))
    }
}

impl fmt::Display for OscUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol.scheme())?;
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}/", self.host, port),
            Some(port) => write!(f, "{}:{}/", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

impl FromStr for OscUrl {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        OscUrl::parse(s)
    }
}
