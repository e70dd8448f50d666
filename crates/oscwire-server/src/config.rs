//! Server configuration

use oscwire_core::DecodeLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ServerError};

/// Default receive timeout; also bounds how long `stop()` can take
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Default cap on future-dated bundles waiting for their time tag
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Server thread configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Longest single blocking receive
    pub read_timeout: Duration,
    /// Bounds applied when decoding received packets
    pub limits: DecodeLimits,
    /// Name of the worker thread
    pub thread_name: String,
    /// Maximum scheduled bundles; further ones are dropped and reported
    pub max_pending: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            limits: DecodeLimits::default(),
            thread_name: "oscwire-server".to_string(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() {
            return Err(ServerError::Config(
                "read_timeout must be greater than zero".to_string(),
            ));
        }
        if self.limits.max_packet_size == 0 {
            return Err(ServerError::Config(
                "limits.max_packet_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
