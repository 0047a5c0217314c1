//! Control client: the high-level entry point.
//!
//! The [`ControlClientBuilder`] provides a fluent API for configuring the
//! socket and an optional connection pool. The [`ControlClient`] turns
//! method + path + body into a [`Request`], runs it over a pooled or
//! one-shot transport, and checks the response status.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::{json, Value};
//! use transcoder_client::ControlClient;
//!
//! let client = ControlClient::builder()
//!     .socket_path("/run/transcoder.sock")
//!     .timeout(Duration::from_secs(5))
//!     .connection_pool(4, Duration::from_secs(30))
//!     .build()?;
//!
//! let job: Value = client.post_json("/api/transcode/start", &json!({"videoId": "abc"}))?;
//! let playlist = client.get_text("/api/hls/abc/master.m3u8")?;
//! # Ok::<(), transcoder_client::TranscoderError>(())
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::JsonCodec;
use crate::config::{PoolConfig, TransportConfig};
use crate::error::{ResponseError, Result};
use crate::http::{Method, Request, Response};
use crate::pool::{ConnectionPool, PoolStats};
use crate::transport::SocketTransport;

/// Body bytes kept in a status error.
pub const ERROR_BODY_EXCERPT: usize = 1000;

/// Body bytes written to the failure log line.
const LOG_BODY_EXCERPT: usize = 500;

const JSON: &str = "application/json";

/// Builder for configuring and creating a [`ControlClient`].
pub struct ControlClientBuilder {
    transport: TransportConfig,
    pool: Option<PoolConfig>,
}

impl ControlClientBuilder {
    /// Create a builder with default settings and no pool.
    pub fn new() -> Self {
        Self {
            transport: TransportConfig::default(),
            pool: None,
        }
    }

    /// Default: `/tmp/transcoder.sock`
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.transport.socket_path = path.into();
        self
    }

    /// Connect, read and write timeout.
    ///
    /// Default: 30 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    /// Largest accepted header or body block.
    ///
    /// Default: 100 MiB
    pub fn max_message_size(mut self, bytes: u64) -> Self {
        self.transport.max_message_size = bytes;
        self
    }

    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.transport.read_buffer_size = bytes;
        self
    }

    pub fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.transport.write_buffer_size = bytes;
        self
    }

    /// Replace the whole transport configuration.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    /// Reuse connections through a pool.
    pub fn connection_pool(mut self, max_pool_size: usize, idle_timeout: Duration) -> Self {
        self.pool = Some(PoolConfig::new(max_pool_size, idle_timeout));
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<ControlClient> {
        let client = ControlClient::new(self.transport)?;
        match self.pool {
            Some(pool) => client.with_connection_pool(pool),
            None => Ok(client),
        }
    }
}

impl Default for ControlClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for the transcoder control API.
///
/// Without a pool, every call opens its own connection and closes it when
/// done. The client is `Sync`; share it behind an `Arc` to use the pool
/// from several threads.
#[derive(Debug)]
pub struct ControlClient {
    config: TransportConfig,
    pool: Option<ConnectionPool>,
}

impl ControlClient {
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, pool: None })
    }

    pub fn builder() -> ControlClientBuilder {
        ControlClientBuilder::new()
    }

    /// Enable connection pooling, replacing any existing pool.
    pub fn with_connection_pool(mut self, pool_config: PoolConfig) -> Result<Self> {
        let pool = ConnectionPool::new(self.config.clone(), pool_config)?;
        tracing::info!(
            max_pool_size = pool.config().max_pool_size,
            idle_timeout = ?pool.config().idle_timeout,
            "Connection pooling enabled"
        );
        self.pool = Some(pool);
        Ok(self)
    }

    /// `None` when pooling is disabled.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(ConnectionPool::stats)
    }

    /// Close every pooled connection and disable pooling.
    pub fn close_pool(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close_all();
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Run `f` on a pooled connection if pooling is enabled, otherwise on
    /// a connection opened for this call only.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SocketTransport) -> Result<T>,
    {
        match &self.pool {
            Some(pool) => pool.with_connection(f),
            None => SocketTransport::with_connection(self.config.clone(), f),
        }
    }

    /// PING the service. True iff it answered PONG.
    pub fn ping(&self) -> Result<bool> {
        self.with_connection(|transport| transport.ping())
    }

    /// Send a request and return the response whatever its status.
    pub fn send(&self, request: &Request) -> Result<Response> {
        self.with_connection(|transport| transport.send_request(request))
    }

    /// Build and send a request without a status check.
    pub fn request(&self, method: Method, path: &str, body: Option<Bytes>) -> Result<Response> {
        let mut request = Request::new(method, path)?.with_header("accept", JSON);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        self.send(&request)
    }

    /// Send a request and fail unless the status is 2xx.
    pub fn execute(&self, request: &Request) -> Result<Response> {
        let response = self.send(request)?;
        ensure_success(response)
    }

    /// GET `path` and decode the JSON body.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = Request::get(path)?.with_header("accept", JSON);
        self.execute(&request)?.json()
    }

    /// POST `body` as JSON and decode the JSON reply.
    pub fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = json_request(Request::post(path, JsonCodec::encode(body)?)?);
        self.execute(&request)?.json()
    }

    /// PUT `body` as JSON and decode the JSON reply.
    pub fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = json_request(Request::put(path, JsonCodec::encode(body)?)?);
        self.execute(&request)?.json()
    }

    /// DELETE `path`; fails unless the status is 2xx.
    pub fn delete(&self, path: &str) -> Result<Response> {
        self.execute(&Request::delete(path)?.with_header("accept", JSON))
    }

    /// DELETE `path`, treating 404 as already gone.
    ///
    /// Returns false if the resource did not exist.
    pub fn delete_if_exists(&self, path: &str) -> Result<bool> {
        let response = self.send(&Request::delete(path)?.with_header("accept", JSON))?;
        if response.status_code() == 404 {
            return Ok(false);
        }
        ensure_success(response).map(|_| true)
    }

    /// GET `path` and return the body as text (playlists, manifests).
    pub fn get_text(&self, path: &str) -> Result<String> {
        let response = self.execute(&Request::get(path)?)?;
        Ok(response.text().into_owned())
    }

    /// HEAD `path`. True iff the status is exactly 200.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let response = self.send(&Request::head(path)?)?;
        Ok(response.status_code() == 200)
    }
}

fn json_request(request: Request) -> Request {
    request
        .with_header("content-type", JSON)
        .with_header("accept", JSON)
}

/// Pass 2xx responses through; turn anything else into `ResponseError::Status`.
fn ensure_success(response: Response) -> Result<Response> {
    if response.is_success() {
        return Ok(response);
    }

    tracing::error!(
        status_code = response.status_code(),
        status_message = response.status_message(),
        body = %excerpt(response.body(), LOG_BODY_EXCERPT),
        "Transcoder request failed"
    );

    Err(ResponseError::Status {
        status_code: response.status_code(),
        status_message: response.status_message().to_string(),
        body: excerpt(response.body(), ERROR_BODY_EXCERPT),
    }
    .into())
}

/// At most `limit` bytes of `body`, lossily decoded.
fn excerpt(body: &[u8], limit: usize) -> String {
    String::from_utf8_lossy(&body[..body.len().min(limit)]).into_owned()
}
