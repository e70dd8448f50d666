//! oscwire core
//!
//! Open Sound Control 1.0 wire types and address matching.
//!
//! This crate provides:
//! - Argument values and their binary encoding ([`Value`], [`codec`])
//! - Messages, bundles and root packets ([`Message`], [`Bundle`], [`Packet`])
//! - NTP64 time tags and clock sources ([`TimeTag`], [`Clock`])
//! - Address pattern compilation and matching ([`AddressPattern`])
//!
//! ```
//! use oscwire_core::{Message, Packet};
//!
//! let msg = Message::new("/synth/1/freq").unwrap().arg(440.0f32);
//! let bytes = msg.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap(), Packet::Message(msg));
//! ```

pub mod address;
pub mod bundle;
pub mod codec;
pub mod error;
pub mod message;
pub mod packet;
pub mod time;
pub mod types;

pub use address::{is_pattern, pattern_matches, AddressPattern};
pub use bundle::Bundle;
pub use codec::{DecodeLimits, DEFAULT_MAX_PACKET_SIZE};
pub use error::{Error, ErrorKind, Result};
pub use message::Message;
pub use packet::Packet;
pub use time::{Clock, SystemClock, TimeTag};
pub use types::{Color, MidiMessage, Value};

/// Conventional default OSC port
pub const DEFAULT_PORT: u16 = 57120;
