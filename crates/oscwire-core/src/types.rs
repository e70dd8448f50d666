//! OSC argument values

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{decode_blob, decode_osc_string, encode_blob, encode_osc_string, padded_len};
use crate::{Error, Result, TimeTag};

/// Type tag characters
pub mod tag {
    pub const INT: char = 'i';
    pub const FLOAT: char = 'f';
    pub const STRING: char = 's';
    pub const SYMBOL: char = 'S';
    pub const BLOB: char = 'b';
    pub const LONG: char = 'h';
    pub const TIME: char = 't';
    pub const DOUBLE: char = 'd';
    pub const CHAR: char = 'c';
    pub const COLOR: char = 'r';
    pub const MIDI: char = 'm';
    pub const TRUE: char = 'T';
    pub const FALSE: char = 'F';
    pub const NIL: char = 'N';
    pub const INF: char = 'I';
    pub const ARRAY_BEGIN: char = '[';
    pub const ARRAY_END: char = ']';
}

/// 32-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub const fn from_u32(rgba: u32) -> Self {
        let b = rgba.to_be_bytes();
        Self::new(b[0], b[1], b[2], b[3])
    }

    pub const fn to_u32(&self) -> u32 {
        u32::from_be_bytes([self.red, self.green, self.blue, self.alpha])
    }
}

/// 4-byte MIDI message: port id, status byte, two data bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MidiMessage {
    pub port: u8,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiMessage {
    pub const fn new(port: u8, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            port,
            status,
            data1,
            data2,
        }
    }
}

/// An OSC argument
///
/// The variant fully determines the type tag, so a value can never disagree
/// with the tag it is written under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
    Symbol(String),
    Blob(Vec<u8>),
    Long(i64),
    Time(TimeTag),
    Double(f64),
    Char(char),
    Color(Color),
    Midi(MidiMessage),
    Bool(bool),
    Nil,
    Inf,
    Array(Vec<Value>),
}

impl Value {
    /// Type tag of this value. Arrays report their opening bracket.
    pub fn type_tag(&self) -> char {
        match self {
            Value::Int(_) => tag::INT,
            Value::Float(_) => tag::FLOAT,
            Value::String(_) => tag::STRING,
            Value::Symbol(_) => tag::SYMBOL,
            Value::Blob(_) => tag::BLOB,
            Value::Long(_) => tag::LONG,
            Value::Time(_) => tag::TIME,
            Value::Double(_) => tag::DOUBLE,
            Value::Char(_) => tag::CHAR,
            Value::Color(_) => tag::COLOR,
            Value::Midi(_) => tag::MIDI,
            Value::Bool(true) => tag::TRUE,
            Value::Bool(false) => tag::FALSE,
            Value::Nil => tag::NIL,
            Value::Inf => tag::INF,
            Value::Array(_) => tag::ARRAY_BEGIN,
        }
    }

    /// Append this value's full tag sequence (arrays include their brackets
    /// and element tags).
    pub fn write_type_tags(&self, out: &mut String) {
        match self {
            Value::Array(items) => {
                out.push(tag::ARRAY_BEGIN);
                for item in items {
                    item.write_type_tags(out);
                }
                out.push(tag::ARRAY_END);
            }
            other => out.push(other.type_tag()),
        }
    }

    /// Number of payload bytes this value occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Int(_) | Value::Float(_) | Value::Char(_) | Value::Color(_) | Value::Midi(_) => 4,
            Value::Long(_) | Value::Time(_) | Value::Double(_) => 8,
            Value::String(s) | Value::Symbol(s) => padded_len(s.len() + 1),
            Value::Blob(b) => 4 + padded_len(b.len()),
            Value::Bool(_) | Value::Nil | Value::Inf => 0,
            Value::Array(items) => items.iter().map(Value::encoded_len).sum(),
        }
    }

    /// Write the payload, big-endian, padded to 4 bytes
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Value::Int(i) => buf.put_i32(*i),
            Value::Float(f) => buf.put_f32(*f),
            Value::String(s) | Value::Symbol(s) => encode_osc_string(buf, s)?,
            Value::Blob(b) => encode_blob(buf, b)?,
            Value::Long(h) => buf.put_i64(*h),
            Value::Time(t) => buf.put_u64(t.to_ntp()),
            Value::Double(d) => buf.put_f64(*d),
            Value::Char(c) => buf.put_u32(*c as u32),
            Value::Color(c) => buf.put_u32(c.to_u32()),
            Value::Midi(m) => buf.put_slice(&[m.port, m.status, m.data1, m.data2]),
            Value::Bool(_) | Value::Nil | Value::Inf => {}
            Value::Array(items) => {
                for item in items {
                    item.encode(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Decode one scalar value for `tag`, consuming exactly its bytes
    /// including padding. Array brackets are handled by the argument list
    /// decoder, see [`crate::codec::decode_arguments`].
    pub fn decode(buf: &mut &[u8], type_tag: char) -> Result<Value> {
        let value = match type_tag {
            tag::INT => Value::Int(take::<4>(buf).map(i32::from_be_bytes)?),
            tag::FLOAT => Value::Float(take::<4>(buf).map(f32::from_be_bytes)?),
            tag::STRING => Value::String(decode_osc_string(buf)?),
            tag::SYMBOL => Value::Symbol(decode_osc_string(buf)?),
            tag::BLOB => Value::Blob(decode_blob(buf)?),
            tag::LONG => Value::Long(take::<8>(buf).map(i64::from_be_bytes)?),
            tag::TIME => Value::Time(TimeTag::from_ntp(take::<8>(buf).map(u64::from_be_bytes)?)),
            tag::DOUBLE => Value::Double(take::<8>(buf).map(f64::from_be_bytes)?),
            tag::CHAR => {
                let raw = take::<4>(buf).map(u32::from_be_bytes)?;
                // Not a code point: a sign-extended 8-bit char, keep its low byte
                Value::Char(char::from_u32(raw).unwrap_or(char::from(raw as u8)))
            }
            tag::COLOR => Value::Color(Color::from_u32(take::<4>(buf).map(u32::from_be_bytes)?)),
            tag::MIDI => {
                let [port, status, data1, data2] = take::<4>(buf)?;
                Value::Midi(MidiMessage::new(port, status, data1, data2))
            }
            tag::TRUE => Value::Bool(true),
            tag::FALSE => Value::Bool(false),
            tag::NIL => Value::Nil,
            tag::INF => Value::Inf,
            tag::ARRAY_BEGIN | tag::ARRAY_END => {
                return Err(Error::MalformedPacket(format!(
                    "array delimiter '{}' carries no payload",
                    type_tag
                )))
            }
            other => return Err(Error::UnknownType(other)),
        };
        Ok(value)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    fn mismatch(&self, expected: char) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.type_tag(),
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.mismatch(tag::INT)),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(other.mismatch(tag::FLOAT)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(tag::STRING)),
        }
    }

    pub fn as_symbol(&self) -> Result<&str> {
        match self {
            Value::Symbol(s) => Ok(s),
            other => Err(other.mismatch(tag::SYMBOL)),
        }
    }

    pub fn as_blob(&self) -> Result<&[u8]> {
        match self {
            Value::Blob(b) => Ok(b),
            other => Err(other.mismatch(tag::BLOB)),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            Value::Long(h) => Ok(*h),
            other => Err(other.mismatch(tag::LONG)),
        }
    }

    pub fn as_time(&self) -> Result<TimeTag> {
        match self {
            Value::Time(t) => Ok(*t),
            other => Err(other.mismatch(tag::TIME)),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(other.mismatch(tag::DOUBLE)),
        }
    }

    pub fn as_char(&self) -> Result<char> {
        match self {
            Value::Char(c) => Ok(*c),
            other => Err(other.mismatch(tag::CHAR)),
        }
    }

    pub fn as_color(&self) -> Result<Color> {
        match self {
            Value::Color(c) => Ok(*c),
            other => Err(other.mismatch(tag::COLOR)),
        }
    }

    pub fn as_midi(&self) -> Result<MidiMessage> {
        match self {
            Value::Midi(m) => Ok(*m),
            other => Err(other.mismatch(tag::MIDI)),
        }
    }

    /// True/False markers only; no truthiness coercion
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch(tag::TRUE)),
        }
    }

    pub fn as_array(&self) -> Result<&[Value]> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(other.mismatch(tag::ARRAY_BEGIN)),
        }
    }
}

#[inline]
fn take<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N]> {
    if buf.remaining() < N {
        return Err(Error::truncated(N, buf.remaining()));
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<TimeTag> for Value {
    fn from(v: TimeTag) -> Self {
        Value::Time(v)
    }
}

impl From<Color> for Value {
    fn from(v: Color) -> Self {
        Value::Color(v)
    }
}

impl From<MidiMessage> for Value {
    fn from(v: MidiMessage) -> Self {
        Value::Midi(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
