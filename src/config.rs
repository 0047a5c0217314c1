//! Transport and pool configuration.
//!
//! Both structs deserialize from a partial document; missing fields fall
//! back to the defaults below. Durations are expressed in seconds and may be
//! fractional (`timeout = 0.5`).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use transcoder_client::config::TransportConfig;
//!
//! let config: TransportConfig =
//!     serde_json::from_str(r#"{"socket_path": "/run/transcoder.sock", "timeout": 2.5}"#).unwrap();
//! assert_eq!(config.timeout, Duration::from_millis(2500));
//! assert_eq!(config.max_message_size, 100 * 1024 * 1024);
//! config.validate().unwrap();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscoderError};
use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Default socket path of the transcoder service.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/transcoder.sock";

/// Default timeout for connect, read and write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read/write buffer size (64KB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default maximum number of pooled connections.
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;

/// Default idle timeout for pooled connections.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for a single socket transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Filesystem path of the Unix domain socket.
    pub socket_path: PathBuf,
    /// Applied to connect, and to every read and write.
    #[serde(with = "seconds")]
    pub timeout: Duration,
    /// Upper bound for a declared header or body length.
    pub max_message_size: u64,
    /// Kernel receive buffer (`SO_RCVBUF`) and the read-side `BufReader`.
    pub read_buffer_size: usize,
    /// Kernel send buffer (`SO_SNDBUF`).
    pub write_buffer_size: usize,
}

impl TransportConfig {
    /// Defaults with a custom socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    /// Reject values that would make the transport unusable.
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(TranscoderError::Config("socket_path must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(TranscoderError::Config("timeout must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(TranscoderError::Config(
                "max_message_size must be positive".into(),
            ));
        }
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(TranscoderError::Config(
                "buffer sizes must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            timeout: DEFAULT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Settings for a [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Soft cap: limits idle connections and non-temporary active ones.
    pub max_pool_size: usize,
    /// Connections unused for longer than this are closed instead of reused.
    #[serde(with = "seconds")]
    pub idle_timeout: Duration,
}

impl PoolConfig {
    pub fn new(max_pool_size: usize, idle_timeout: Duration) -> Self {
        Self {
            max_pool_size,
            idle_timeout,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(TranscoderError::Config(
                "max_pool_size must be positive".into(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(TranscoderError::Config("idle_timeout must be positive".into()));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Serde helpers for a `Duration` written as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
