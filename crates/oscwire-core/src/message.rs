//! OSC messages
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ address pattern (OSC-string) │  "/synth/1/freq\0\0\0"
//! │ type tags       (OSC-string) │  ",fi\0"
//! │ arguments                    │  one payload per tag, in order
//! └──────────────────────────────┘
//! ```

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{
    decode_arguments, decode_osc_string, encode_arguments, encode_osc_string, padded_len,
    type_tag_string, DecodeLimits,
};
use crate::{Error, Result, Value};

/// Characters with pattern meaning; not allowed in a concrete send target
pub const PATTERN_CHARS: &[char] = &['?', '*', '[', ']', '{', '}'];

/// An OSC message: address plus ordered arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    path: String,
    args: Vec<Value>,
}

impl Message {
    /// Create a message with no arguments. The path must start with `/`.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self {
            path,
            args: Vec::new(),
        })
    }

    pub fn with_args(path: impl Into<String>, args: Vec<Value>) -> Result<Self> {
        let mut msg = Self::new(path)?;
        msg.args = args;
        Ok(msg)
    }

    /// Append an argument (builder style)
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.args.push(value.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    /// Argument at `index`, if present
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Type-tag string including the leading `,`
    pub fn type_tags(&self) -> String {
        type_tag_string(&self.args)
    }

    /// Whether the path is a concrete address usable as a send target
    pub fn is_concrete(&self) -> bool {
        !self.path.contains(PATTERN_CHARS)
    }

    /// Reject paths that contain pattern characters
    pub fn validate_target(&self) -> Result<()> {
        if !self.is_concrete() {
            return Err(Error::InvalidMessage(format!(
                "send target contains wildcard characters: {}",
                self.path
            )));
        }
        Ok(())
    }

    /// Serialized size in bytes
    pub fn encoded_len(&self) -> usize {
        let tags = self.type_tags();
        padded_len(self.path.len() + 1)
            + padded_len(tags.len() + 1)
            + self.args.iter().map(Value::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        encode_osc_string(buf, &self.path)?;
        encode_osc_string(buf, &self.type_tags())?;
        encode_arguments(buf, &self.args)
    }

    /// Decode with default limits
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_limits(bytes, &DecodeLimits::default())
    }

    pub fn decode_with_limits(bytes: &[u8], limits: &DecodeLimits) -> Result<Self> {
        limits.check_size(bytes.len())?;
        if bytes.len() % 4 != 0 {
            return Err(Error::MalformedPacket(format!(
                "message length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        let mut buf = bytes;
        if buf.first() != Some(&b'/') {
            return Err(Error::InvalidMessage(
                "address must start with '/'".to_string(),
            ));
        }
        let path = decode_osc_string(&mut buf)?;

        // Pre-1.0 senders may omit the type-tag string entirely
        if buf.is_empty() {
            return Ok(Self {
                path,
                args: Vec::new(),
            });
        }
        if buf[0] != b',' {
            return Err(Error::MalformedPacket(
                "type-tag string must start with ','".to_string(),
            ));
        }
        let tags = decode_osc_string(&mut buf)?;
        let args = decode_arguments(&tags[1..], &mut buf, limits)?;

        if !buf.is_empty() {
            return Err(Error::MalformedPacket(format!(
                "{} trailing bytes after arguments of {}",
                buf.len(),
                path
            )));
        }

        Ok(Self { path, args })
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::InvalidMessage(format!(
            "address must start with '/': {:?}",
            path
        )));
    }
    if path.contains('\0') {
        return Err(Error::InvalidMessage(
            "address contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.path, self.type_tags())
    }
}
