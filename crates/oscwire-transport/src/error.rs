//! Transport error types

use oscwire_core::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("timeout")]
    Timeout,

    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Map onto the shared failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::BindFailed { .. } | TransportError::Io(_) => ErrorKind::Socket,
            TransportError::Unsupported(_) => ErrorKind::Platform,
            TransportError::FrameTooLarge { .. } => ErrorKind::MessageSize,
            TransportError::ConnectionClosed
            | TransportError::SendFailed(_)
            | TransportError::ReceiveFailed(_)
            | TransportError::InvalidUrl(_)
            | TransportError::Timeout => ErrorKind::Network,
        }
    }
}
