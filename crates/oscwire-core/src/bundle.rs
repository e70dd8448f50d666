//! OSC bundles
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ "#bundle\0"                 8 bytes │
//! │ time tag (NTP64)            8 bytes │
//! ├─────────────────────────────────────┤
//! │ element size (u32 BE)       4 bytes │  repeated until
//! │ element (message or bundle)         │  input is exhausted
//! └─────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{DecodeLimits, BUNDLE_TAG};
use crate::{Error, Message, Packet, Result, TimeTag};

/// Marker plus time tag
pub const BUNDLE_HEADER_LEN: usize = 16;

/// A time-tagged group of messages and nested bundles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub timetag: TimeTag,
    pub content: Vec<Packet>,
}

impl Bundle {
    pub fn new(timetag: TimeTag) -> Self {
        Self {
            timetag,
            content: Vec::new(),
        }
    }

    pub fn immediate() -> Self {
        Self::new(TimeTag::IMMEDIATE)
    }

    /// Append an element (builder style)
    pub fn with(mut self, element: impl Into<Packet>) -> Self {
        self.content.push(element.into());
        self
    }

    pub fn push(&mut self, element: impl Into<Packet>) -> &mut Self {
        self.content.push(element.into());
        self
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Visit every message in this bundle and its descendants, depth-first
    /// in element order
    pub fn for_each_message<F: FnMut(&Message)>(&self, mut f: F) {
        self.walk(&mut f);
    }

    fn walk<F: FnMut(&Message)>(&self, f: &mut F) {
        for element in &self.content {
            match element {
                Packet::Message(m) => f(m),
                Packet::Bundle(b) => b.walk(f),
            }
        }
    }

    /// Deepest nesting level; a bundle holding only messages has depth 1
    pub fn depth(&self) -> usize {
        1 + self
            .content
            .iter()
            .map(|p| match p {
                Packet::Bundle(b) => b.depth(),
                Packet::Message(_) => 0,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn encoded_len(&self) -> usize {
        BUNDLE_HEADER_LEN + self.content.iter().map(|p| 4 + p.encoded_len()).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(BUNDLE_TAG);
        buf.put_u64(self.timetag.to_ntp());

        for element in &self.content {
            // Reserve the size slot, then patch it once the element is written
            let size_at = buf.len();
            buf.put_u32(0);
            element.encode_to(buf)?;
            let size = buf.len() - size_at - 4;
            let size = u32::try_from(size).map_err(|_| Error::BufferOverflow(size))?;
            buf[size_at..size_at + 4].copy_from_slice(&size.to_be_bytes());
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_limits(bytes, &DecodeLimits::default())
    }

    pub fn decode_with_limits(bytes: &[u8], limits: &DecodeLimits) -> Result<Self> {
        limits.check_size(bytes.len())?;
        Self::decode_nested(bytes, limits, 1)
    }

    pub(crate) fn decode_nested(bytes: &[u8], limits: &DecodeLimits, depth: usize) -> Result<Self> {
        if depth > limits.max_bundle_depth {
            return Err(Error::MalformedPacket(format!(
                "bundle nesting exceeds {} levels",
                limits.max_bundle_depth
            )));
        }
        if bytes.len() < BUNDLE_TAG.len() || &bytes[..BUNDLE_TAG.len()] != BUNDLE_TAG {
            return Err(Error::InvalidBundle(
                "missing \"#bundle\" marker".to_string(),
            ));
        }
        if bytes.len() < BUNDLE_HEADER_LEN {
            return Err(Error::MalformedPacket(format!(
                "bundle header truncated: {} bytes",
                bytes.len()
            )));
        }

        let mut buf = &bytes[BUNDLE_TAG.len()..];
        let timetag = TimeTag::from_ntp(buf.get_u64());
        let mut content = Vec::new();

        while buf.has_remaining() {
            if buf.remaining() < 4 {
                return Err(Error::MalformedPacket(format!(
                    "{} stray bytes where an element size was expected",
                    buf.remaining()
                )));
            }
            let size = buf.get_u32() as usize;
            if size == 0 || size % 4 != 0 {
                return Err(Error::MalformedPacket(format!(
                    "invalid bundle element size {}",
                    size
                )));
            }
            if size > buf.remaining() {
                return Err(Error::MalformedPacket(format!(
                    "bundle element size {} exceeds the {} remaining bytes",
                    size,
                    buf.remaining()
                )));
            }

            let element = &buf[..size];
            let packet = if element.starts_with(BUNDLE_TAG) {
                Packet::Bundle(Bundle::decode_nested(element, limits, depth + 1)?)
            } else {
                Packet::Message(Message::decode_with_limits(element, limits)?)
            };
            content.push(packet);
            buf.advance(size);
        }

        Ok(Self { timetag, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn msg(path: &str) -> Message {
        Message::new(path).unwrap()
    }

    #[test]
    fn test_wire_layout() {
        let bundle = Bundle::new(TimeTag::new(1, 2)).with(msg("/a"));
        let bytes = bundle.encode().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"#bundle\0");
        expected.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 2]);
        expected.extend_from_slice(&[0, 0, 0, 8]);
        expected.extend_from_slice(b"/a\0\0,\0\0\0");
        assert_eq!(&bytes[..], &expected[..]);
        assert_eq!(bytes.len(), bundle.encoded_len());
    }

    #[test]
    fn test_empty_bundle() {
        let bytes = Bundle::immediate().encode().unwrap();
        assert_eq!(bytes.len(), 16);
        let decoded = Bundle::decode(&bytes).unwrap();
        assert!(decoded.timetag.is_immediate());
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_bad_marker() {
        let mut bytes = Bundle::immediate().with(msg("/x")).encode().unwrap().to_vec();
        bytes[1] = b'B';
        let err = Bundle::decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBundle);
    }

    #[test]
    fn test_element_size_overrun() {
        let mut bytes = Bundle::immediate().with(msg("/x")).encode().unwrap().to_vec();
        bytes[19] = 64;
        let err = Bundle::decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPacket);
    }

    #[test]
    fn test_depth_limit() {
        let mut bundle = Bundle::immediate().with(msg("/leaf"));
        for _ in 0..4 {
            bundle = Bundle::immediate().with(bundle);
        }
        assert_eq!(bundle.depth(), 5);
        let bytes = bundle.encode().unwrap();

        let tight = DecodeLimits {
            max_bundle_depth: 4,
            ..DecodeLimits::default()
        };
        let err = Bundle::decode_with_limits(&bytes, &tight).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPacket);
        assert_eq!(Bundle::decode(&bytes).unwrap(), bundle);
    }

    #[test]
    fn test_for_each_message_order() {
        let bundle = Bundle::immediate()
            .with(msg("/1"))
            .with(Bundle::immediate().with(msg("/2")).with(msg("/3")))
            .with(msg("/4"));
        let mut seen = Vec::new();
        bundle.for_each_message(|m| seen.push(m.path().to_string()));
        assert_eq!(seen, ["/1", "/2", "/3", "/4"]);
    }
}
