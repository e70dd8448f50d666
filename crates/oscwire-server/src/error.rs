//! Server error types

use oscwire_core::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("core protocol error: {0}")]
    Core(#[from] oscwire_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] oscwire_transport::TransportError),

    #[error("server already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("failed to spawn server thread: {0}")]
    Spawn(std::io::Error),

    #[error("pending queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Map onto the shared failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Core(e) => e.kind(),
            ServerError::Transport(e) => e.kind(),
            ServerError::QueueFull { .. } => ErrorKind::OutOfMemory,
            ServerError::AlreadyRunning
            | ServerError::NotRunning
            | ServerError::Spawn(_)
            | ServerError::Config(_) => ErrorKind::Platform,
        }
    }
}
