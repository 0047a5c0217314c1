//! Blocking socket transport: one connection, one exchange at a time.
//!
//! # Example
//!
//! ```no_run
//! use transcoder_client::config::TransportConfig;
//! use transcoder_client::http::Request;
//! use transcoder_client::transport::SocketTransport;
//!
//! let config = TransportConfig::new("/tmp/transcoder.sock");
//! let response = SocketTransport::with_connection(config, |transport| {
//!     transport.send_request(&Request::get("/api/health")?)
//! })?;
//! assert!(response.is_success());
//! # Ok::<(), transcoder_client::TranscoderError>(())
//! ```

use std::io::{BufReader, ErrorKind};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, SockAddr, Socket, Type};

use super::io::{read_message, write_full};
use super::Stream;
use crate::config::TransportConfig;
use crate::error::{ConnectionError, Result, TranscoderError};
use crate::http::{Request, Response};
use crate::protocol::{Message, MessageType};

const CONNECT_RETRY_MIN: Duration = Duration::from_millis(1);
const CONNECT_RETRY_MAX: Duration = Duration::from_millis(50);

/// True when a nonblocking connect has not failed, only not finished.
fn connect_pending(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || matches!(e.raw_os_error(), Some(libc::EINPROGRESS | libc::EALREADY))
}

enum State<S> {
    /// Created, never connected.
    Idle,
    Connected(BufReader<S>),
    /// Disconnected. Terminal.
    Closed,
}

/// Owns one stream connection to the transcoder.
///
/// States: idle → connected → closed. A closed transport cannot reconnect;
/// create a new one instead. Any read, write or framing error disconnects
/// the transport before it is returned.
pub struct SocketTransport<S = UnixStream> {
    config: TransportConfig,
    state: State<S>,
}

impl SocketTransport<UnixStream> {
    /// Create an unconnected transport.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: State::Idle,
        }
    }

    /// Create and connect in one step.
    pub fn open(config: TransportConfig) -> Result<Self> {
        let mut transport = Self::new(config);
        transport.connect()?;
        Ok(transport)
    }

    /// Connect to the configured socket path.
    ///
    /// The configured timeout bounds the connect itself (a listener with a
    /// full backlog yields `ConnectionError::Timeout`) and every later read
    /// and write. Socket buffers are sized from the config and the socket is
    /// left in blocking mode.
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            State::Connected(_) => {
                return Err(ConnectionError::AlreadyConnected {
                    path: self.config.socket_path.clone(),
                }
                .into())
            }
            State::Closed => return Err(ConnectionError::Closed.into()),
            State::Idle => {}
        }

        let path = &self.config.socket_path;
        let timeout = self.config.timeout;

        let socket = self.connect_socket()?;
        socket
            .set_send_buffer_size(self.config.write_buffer_size)
            .and_then(|_| socket.set_recv_buffer_size(self.config.read_buffer_size))
            .and_then(|_| socket.set_nonblocking(false))
            .map_err(|e| self.connect_error(e))?;

        let stream = UnixStream::from(std::os::fd::OwnedFd::from(socket));
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|_| stream.set_write_timeout(Some(timeout)))
            .map_err(|e| self.connect_error(e))?;

        tracing::debug!(path = %path.display(), ?timeout, "Connected to transcoder");
        self.state = State::Connected(BufReader::with_capacity(
            self.config.read_buffer_size,
            stream,
        ));
        Ok(())
    }

    /// Run `f` on a fresh connection, disconnecting on every exit path.
    pub fn with_connection<T, F>(config: TransportConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut transport = Self::open(config)?;
        let result = f(&mut transport);
        transport.disconnect();
        result
    }

    /// A second handle to the live socket, used to force it closed from
    /// another thread. `None` when not connected.
    pub(crate) fn shutdown_handle(&self) -> Option<UnixStream> {
        match &self.state {
            State::Connected(reader) => reader.get_ref().try_clone().ok(),
            _ => None,
        }
    }

    /// Nonblocking connect, retried until the timeout elapses.
    ///
    /// A Unix listener with a full accept queue answers `EAGAIN` instead of
    /// parking the caller, so the attempt is repeated with a short backoff.
    fn connect_socket(&self) -> Result<Socket> {
        let addr = SockAddr::unix(&self.config.socket_path).map_err(|e| self.connect_error(e))?;
        let socket =
            Socket::new(Domain::UNIX, Type::STREAM, None).map_err(|e| self.connect_error(e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| self.connect_error(e))?;

        let deadline = Instant::now() + self.config.timeout;
        let mut backoff = CONNECT_RETRY_MIN;
        loop {
            match socket.connect(&addr) {
                Ok(()) => return Ok(socket),
                // An earlier in-progress attempt completed.
                Err(e) if e.raw_os_error() == Some(libc::EISCONN) => return Ok(socket),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if connect_pending(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ConnectionError::Timeout {
                            path: self.config.socket_path.clone(),
                            timeout: self.config.timeout,
                        }
                        .into());
                    }
                    thread::sleep(backoff.min(deadline - now));
                    backoff = (backoff * 2).min(CONNECT_RETRY_MAX);
                }
                Err(e) => return Err(self.connect_error(e).into()),
            }
        }
    }

    fn connect_error(&self, e: std::io::Error) -> ConnectionError {
        let path = self.config.socket_path.clone();
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnectionError::Timeout {
                path,
                timeout: self.config.timeout,
            },
            _ => ConnectionError::ConnectFailed {
                path,
                errno: e.raw_os_error(),
                message: e.to_string(),
            },
        }
    }
}

impl<S: Stream> SocketTransport<S> {
    /// Wrap an already-connected stream.
    pub fn from_stream(config: TransportConfig, stream: S) -> Self {
        let reader = BufReader::with_capacity(config.read_buffer_size, stream);
        Self {
            config,
            state: State::Connected(reader),
        }
    }

    /// Send a REQUEST and wait for its response.
    ///
    /// An ERROR reply becomes `ResponseError::Server`; the connection stays
    /// usable in that case since the envelope was read completely.
    pub fn send_request(&mut self, request: &Request) -> Result<Response> {
        let reply = self.exchange(&request.to_message()?)?;
        Response::from_message(reply)
    }

    /// Send a PING. Returns true iff the peer answers PONG.
    pub fn ping(&mut self) -> Result<bool> {
        let reply = self.exchange(&Message::ping())?;
        Ok(reply.message_type == MessageType::Pong)
    }

    /// Write one message and read one message back.
    pub fn exchange(&mut self, message: &Message) -> Result<Message> {
        // Encoding failures leave the stream untouched.
        let encoded = message.encode()?;

        let reader = match &mut self.state {
            State::Connected(reader) => reader,
            _ => return Err(ConnectionError::NotConnected.into()),
        };

        let max = self.config.max_message_size;
        let result = write_full(reader.get_mut(), &encoded)
            .map_err(TranscoderError::from)
            .and_then(|_| read_message(reader, max));

        if let Err(e) = &result {
            tracing::warn!(
                error = %e,
                message_type = message.message_type.name(),
                "Exchange failed, disconnecting"
            );
            self.disconnect();
        }
        result
    }

    /// Close the connection. Idempotent; never fails.
    pub fn disconnect(&mut self) {
        if let State::Connected(reader) = std::mem::replace(&mut self.state, State::Closed) {
            reader.get_ref().shutdown();
            tracing::debug!(
                path = %self.config.socket_path.display(),
                "Disconnected from transcoder"
            );
        }
    }

    /// True iff connected and the stream reports itself open.
    pub fn is_connected(&self) -> bool {
        match &self.state {
            State::Connected(reader) => reader.get_ref().is_open(),
            _ => false,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl<S> std::fmt::Debug for SocketTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Idle => "idle",
            State::Connected(_) => "connected",
            State::Closed => "closed",
        };
        f.debug_struct("SocketTransport")
            .field("socket_path", &self.config.socket_path)
            .field("state", &state)
            .finish()
    }
}
