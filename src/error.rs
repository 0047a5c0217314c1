//! Error types for transcoder-client.
//!
//! Errors are grouped by the layer that detected them so callers can decide
//! how to recover: transport-level failures (connection, read, write,
//! protocol) justify reconnecting, while response errors mean the remote
//! service rejected the request and retrying the same exchange is pointless.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for all transcoder-client operations.
#[derive(Debug, Error)]
pub enum TranscoderError {
    /// Connection could not be established or is not usable.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Writing a message to the socket failed.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Reading a message from the socket failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The peer violated the wire format.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer answered, but reported a failure.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// A message could not be encoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A request could not be built (bad path, unknown method).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TranscoderError {
    /// True if the failure happened locally or on the stream itself.
    ///
    /// The connection that produced such an error is dead; a fresh
    /// connection may succeed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TranscoderError::Connection(_)
                | TranscoderError::Write(_)
                | TranscoderError::Read(_)
                | TranscoderError::Protocol(_)
        )
    }

    /// True if the remote service received the request and rejected it.
    pub fn is_remote(&self) -> bool {
        matches!(self, TranscoderError::Response(_))
    }
}

/// Connection lifecycle errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// An exchange was attempted without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called on a transport that is already connected.
    #[error("Already connected to {}", path.display())]
    AlreadyConnected { path: PathBuf },

    /// The transport was disconnected and cannot be reused.
    #[error("Transport is closed and cannot be reconnected")]
    Closed,

    /// The OS refused the connection.
    #[error("Failed to connect to {}: {message} (errno {errno:?})", path.display())]
    ConnectFailed {
        path: PathBuf,
        errno: Option<i32>,
        message: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("Connection to {} timed out after {timeout:?}", path.display())]
    Timeout { path: PathBuf, timeout: Duration },
}

/// Write-side errors. The transport is always disconnected before these propagate.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The write failed before any progress could be made.
    #[error("Write failed: {0}")]
    Failed(String),

    /// Only part of the message reached the socket.
    #[error("Incomplete write: expected {expected} bytes, wrote {actual}")]
    Incomplete { expected: usize, actual: usize },
}

/// Read-side errors. Always fatal to the transport.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The read timeout elapsed before the required bytes arrived.
    #[error("Read timed out: expected {expected} bytes, received {actual}")]
    Timeout { expected: usize, actual: usize },

    /// The peer closed the stream in the middle of a message.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Any other OS-level read failure.
    #[error("Read failed: {0}")]
    Failed(String),
}

/// Framing violations. A stream cannot be resynchronized after one of these.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid protocol magic: 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// A declared header or body length exceeds the configured maximum.
    #[error("Message size {declared} exceeds maximum {max}")]
    MessageTooLarge { declared: u64, max: u64 },

    #[error("Invalid headers JSON: {0}")]
    InvalidHeadersJson(String),

    /// A buffer ended before a complete message could be decoded.
    #[error("Truncated message: {needed} more bytes needed")]
    Truncated { needed: usize },
}

/// Failures reported by the remote service.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The response carried a non-success status.
    #[error("Request failed with status {status_code} {status_message}")]
    Status {
        status_code: u16,
        status_message: String,
        /// Bounded excerpt of the response body.
        body: String,
    },

    /// The peer answered with an ERROR envelope.
    #[error("Server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The body could not be decoded as the expected type.
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Result type alias using TranscoderError.
pub type Result<T> = std::result::Result<T, TranscoderError>;
