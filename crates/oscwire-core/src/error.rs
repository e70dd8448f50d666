//! Error types for oscwire

use thiserror::Error;

/// Result type alias for oscwire core operations
pub type Result<T> = std::result::Result<T, Error>;

/// oscwire core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Structurally invalid bytes (bad length prefix, bad type-tag string, trailing data)
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Payload shorter than its declared or implied length
    #[error("buffer too small: need {needed} bytes, have {have}")]
    Deserialization { needed: usize, have: usize },

    /// Unrecognized type tag
    #[error("unknown type tag: {0:?}")]
    UnknownType(char),

    /// Accessor called against a different stored variant
    #[error("type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: char, found: char },

    /// Message structure rule violated
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Bundle structure rule violated
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// Packet exceeds the configured limit
    #[error("packet too large: {size} bytes (max {max})")]
    MessageSize { size: usize, max: usize },

    /// Malformed address pattern
    #[error("invalid pattern: {0}")]
    Pattern(String),

    /// Matcher invariant violated or work bound exhausted
    #[error("match error: {0}")]
    Match(String),

    /// A length does not fit its wire field
    #[error("buffer overflow: {0} bytes does not fit a 32-bit length field")]
    BufferOverflow(usize),

    /// Allocation refused while encoding
    #[error("out of memory while encoding {0} bytes")]
    OutOfMemory(usize),
}

/// Failure kind, for branching without matching on payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedPacket,
    Deserialization,
    UnknownType,
    TypeMismatch,
    InvalidMessage,
    InvalidBundle,
    MessageSize,
    Pattern,
    Match,
    BufferOverflow,
    OutOfMemory,
    /// Transport-layer failures; never produced by the codec itself
    Network,
    Socket,
    Platform,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedPacket(_) => ErrorKind::MalformedPacket,
            Error::Deserialization { .. } => ErrorKind::Deserialization,
            Error::UnknownType(_) => ErrorKind::UnknownType,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Error::InvalidBundle(_) => ErrorKind::InvalidBundle,
            Error::MessageSize { .. } => ErrorKind::MessageSize,
            Error::Pattern(_) => ErrorKind::Pattern,
            Error::Match(_) => ErrorKind::Match,
            Error::BufferOverflow(_) => ErrorKind::BufferOverflow,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
        }
    }

    pub(crate) fn truncated(needed: usize, have: usize) -> Self {
        Error::Deserialization { needed, have }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedPacket => "malformed packet",
            ErrorKind::Deserialization => "deserialization",
            ErrorKind::UnknownType => "unknown type",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::InvalidMessage => "invalid message",
            ErrorKind::InvalidBundle => "invalid bundle",
            ErrorKind::MessageSize => "message size",
            ErrorKind::Pattern => "pattern",
            ErrorKind::Match => "match",
            ErrorKind::BufferOverflow => "buffer overflow",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::Network => "network",
            ErrorKind::Socket => "socket",
            ErrorKind::Platform => "platform",
        };
        f.write_str(name)
    }
}
