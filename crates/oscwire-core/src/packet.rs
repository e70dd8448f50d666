//! Root packets: a message or a bundle

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{DecodeLimits, BUNDLE_TAG};
use crate::{Bundle, Error, Message, Result};

/// Anything that can travel as a datagram or a bundle element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl Packet {
    /// Decode with default limits
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_limits(bytes, &DecodeLimits::default())
    }

    /// Decode a root packet, choosing bundle or message by its first bytes
    pub fn decode_with_limits(bytes: &[u8], limits: &DecodeLimits) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::MalformedPacket("empty packet".to_string()));
        }
        if bytes[0] == b'#' {
            Bundle::decode_with_limits(bytes, limits).map(Packet::Bundle)
        } else {
            Message::decode_with_limits(bytes, limits).map(Packet::Message)
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Packet::Message(m) => m.encode(),
            Packet::Bundle(b) => b.encode(),
        }
    }

    /// Encode, refusing packets larger than `max_size` bytes
    pub fn encode_with_limit(&self, max_size: usize) -> Result<Bytes> {
        let size = self.encoded_len();
        if size > max_size {
            return Err(Error::MessageSize {
                size,
                max: max_size,
            });
        }
        self.encode()
    }

    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Packet::Message(m) => m.encode_to(buf),
            Packet::Bundle(b) => b.encode_to(buf),
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Packet::Message(m) => m.encoded_len(),
            Packet::Bundle(b) => b.encoded_len(),
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, Packet::Bundle(_))
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Packet::Message(m) => Some(m),
            Packet::Bundle(_) => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Packet::Bundle(b) => Some(b),
            Packet::Message(_) => None,
        }
    }
}

/// Whether raw bytes start with the bundle marker
pub fn is_bundle(bytes: &[u8]) -> bool {
    bytes.starts_with(BUNDLE_TAG)
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Packet::Message(m)
    }
}

impl From<Bundle> for Packet {
    fn from(b: Bundle) -> Self {
        Packet::Bundle(b)
    }
}
