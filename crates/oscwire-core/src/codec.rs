//! OSC wire primitives
//!
//! ```text
//! OSC-string: bytes, one NUL terminator, NUL padding to a multiple of 4
//! OSC-blob:   u32 length N (big-endian), N bytes, NUL padding to a multiple of 4
//! ```
//!
//! All numeric payloads are big-endian. Decoders take `&mut &[u8]` and
//! advance the slice past exactly the bytes they own.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::types::tag;
use crate::{Error, Result, Value};

/// Bundle marker, already NUL-padded to 8 bytes
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Default upper bound on a single packet
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65536;

/// Resource bounds applied while decoding untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeLimits {
    /// Largest accepted root packet, in bytes
    pub max_packet_size: usize,
    /// Deepest accepted bundle-in-bundle nesting (root bundle is depth 1)
    pub max_bundle_depth: usize,
    /// Deepest accepted `[` nesting in a type-tag string
    pub max_array_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_bundle_depth: 16,
            max_array_depth: 16,
        }
    }
}

impl DecodeLimits {
    pub(crate) fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_packet_size {
            return Err(Error::MessageSize {
                size,
                max: self.max_packet_size,
            });
        }
        Ok(())
    }
}

/// Round `len` up to the next multiple of 4
#[inline(always)]
pub const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

#[inline]
fn put_padding(buf: &mut BytesMut, written: usize) {
    buf.put_bytes(0, padded_len(written) - written);
}

/// Write an OSC-string. Interior NUL bytes cannot be represented.
pub fn encode_osc_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(Error::InvalidMessage(format!(
            "string contains a NUL byte: {:?}",
            s
        )));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    put_padding(buf, s.len() + 1);
    Ok(())
}

/// Read an OSC-string including its terminator and padding
pub fn decode_osc_string(buf: &mut &[u8]) -> Result<String> {
    let nul = buf.iter().position(|&b| b == 0).ok_or_else(|| {
        Error::MalformedPacket("OSC-string is missing its NUL terminator".to_string())
    })?;
    let total = padded_len(nul + 1);
    if buf.remaining() < total {
        return Err(Error::truncated(total, buf.remaining()));
    }
    let s = std::str::from_utf8(&buf[..nul])
        .map_err(|e| Error::MalformedPacket(format!("OSC-string is not UTF-8: {}", e)))?
        .to_string();
    buf.advance(total);
    Ok(s)
}

/// Write an OSC-blob: length prefix, bytes, padding (excluded from the length)
pub fn encode_blob(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| Error::BufferOverflow(data.len()))?;
    buf.put_u32(len);
    buf.put_slice(data);
    put_padding(buf, data.len());
    Ok(())
}

/// Read an OSC-blob including its padding
pub fn decode_blob(buf: &mut &[u8]) -> Result<Vec<u8>> {
    if buf.remaining() < 4 {
        return Err(Error::truncated(4, buf.remaining()));
    }
    let len = buf.get_i32();
    if len < 0 {
        return Err(Error::MalformedPacket(format!("negative blob length {}", len)));
    }
    let len = len as usize;
    let total = padded_len(len);
    if buf.remaining() < total {
        return Err(Error::truncated(total, buf.remaining()));
    }
    let data = buf[..len].to_vec();
    buf.advance(total);
    Ok(data)
}

/// Build the `,`-prefixed type-tag string for an argument list
pub fn type_tag_string(args: &[Value]) -> String {
    let mut tags = String::with_capacity(args.len() + 1);
    tags.push(',');
    for arg in args {
        arg.write_type_tags(&mut tags);
    }
    tags
}

/// Encode the payloads of an argument list, in order
pub fn encode_arguments(buf: &mut BytesMut, args: &[Value]) -> Result<()> {
    for arg in args {
        arg.encode(buf)?;
    }
    Ok(())
}

/// Decode the payloads described by `tags` (without the leading `,`).
///
/// `[` and `]` group the values between them into a [`Value::Array`].
pub fn decode_arguments(tags: &str, buf: &mut &[u8], limits: &DecodeLimits) -> Result<Vec<Value>> {
    // Innermost open array is last; index 0 is the top-level list.
    let mut stack: Vec<Vec<Value>> = vec![Vec::with_capacity(tags.len())];

    for t in tags.chars() {
        match t {
            tag::ARRAY_BEGIN => {
                if stack.len() > limits.max_array_depth {
                    return Err(Error::MalformedPacket(format!(
                        "array nesting exceeds {} levels",
                        limits.max_array_depth
                    )));
                }
                stack.push(Vec::new());
            }
            tag::ARRAY_END => {
                if stack.len() == 1 {
                    return Err(Error::MalformedPacket(
                        "unbalanced ']' in type-tag string".to_string(),
                    ));
                }
                let items = stack.pop().unwrap_or_default();
                push_value(&mut stack, Value::Array(items));
            }
            other => {
                let value = Value::decode(buf, other)?;
                push_value(&mut stack, value);
            }
        }
    }

    if stack.len() != 1 {
        return Err(Error::MalformedPacket(
            "unbalanced '[' in type-tag string".to_string(),
        ));
    }
    Ok(stack.pop().unwrap_or_default())
}

#[inline]
fn push_value(stack: &mut [Vec<Value>], value: Value) {
    if let Some(top) = stack.last_mut() {
        top.push(value);
    }
}
