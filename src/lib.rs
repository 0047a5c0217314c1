//! # transcoder-client
//!
//! Blocking Rust client for the transcoder control socket.
//!
//! The transcoder is a local media service reachable over a Unix domain
//! socket. Every exchange is one binary envelope each way: an 8-byte fixed
//! header, an optional length-prefixed JSON header block and an optional
//! length-prefixed body block.
//!
//! ## Layers
//!
//! - [`protocol`]: envelope encoding and decoding, no I/O
//! - [`transport`]: one blocking socket connection, exact-length reads and
//!   full writes, typed I/O errors
//! - [`pool`]: reuse of connections across calls and threads
//! - [`ControlClient`]: HTTP-style requests with status checking
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use transcoder_client::ControlClient;
//!
//! let client = ControlClient::builder()
//!     .socket_path("/tmp/transcoder.sock")
//!     .connection_pool(10, Duration::from_secs(60))
//!     .build()?;
//!
//! if client.ping()? {
//!     let health: serde_json::Value = client.get_json("/api/health")?;
//!     println!("{health}");
//! }
//! # Ok::<(), transcoder_client::TranscoderError>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod pool;
pub mod protocol;
pub mod transport;

mod client;

#[cfg(test)]
mod test_support;

pub use client::{ControlClient, ControlClientBuilder};
pub use config::{PoolConfig, TransportConfig};
pub use error::{Result, TranscoderError};
pub use http::{Method, Request, Response};
pub use pool::{ConnectionPool, PoolStats};
pub use transport::SocketTransport;
