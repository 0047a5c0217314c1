//! In-crate test helpers: scripted in-memory streams and a socket peer.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::protocol::{HeaderMap, Message, MessageType, DEFAULT_MAX_MESSAGE_SIZE};
use crate::transport::{read_message, Stream};

/// One scripted result of `Read::read`.
pub enum ReadStep {
    Data(Vec<u8>),
    Error(ErrorKind),
}

/// Shared view of a [`MockStream`] that survives the stream being moved.
#[derive(Clone, Default)]
pub struct MockProbe {
    bytes_read: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl MockProbe {
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory stream with scripted reads and throttled writes.
///
/// Reads are served from the script and return EOF once it is exhausted.
#[derive(Default)]
pub struct MockStream {
    reads: VecDeque<ReadStep>,
    write_chunk: Option<usize>,
    write_limit: Option<usize>,
    write_error: Option<ErrorKind>,
    probe: MockProbe,
}

impl MockStream {
    /// Serve `data` in chunks of at most `chunk` bytes.
    pub fn chunked(data: Vec<u8>, chunk: usize) -> Self {
        let reads = data
            .chunks(chunk.max(1))
            .map(|c| ReadStep::Data(c.to_vec()))
            .collect();
        Self {
            reads,
            ..Self::default()
        }
    }

    pub fn scripted(steps: Vec<ReadStep>) -> Self {
        Self {
            reads: steps.into(),
            ..Self::default()
        }
    }

    /// Accept at most `chunk` bytes per `write` call.
    pub fn with_write_chunk(mut self, chunk: usize) -> Self {
        self.write_chunk = Some(chunk);
        self
    }

    /// Accept `limit` bytes in total, then return `Ok(0)` (or the configured error).
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn fail_writes(&mut self, kind: ErrorKind) {
        self.write_error = Some(kind);
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    pub fn bytes_read(&self) -> usize {
        self.probe.bytes_read()
    }

    pub fn written(&self) -> Vec<u8> {
        self.probe.written()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(ReadStep::Error(kind)) => Err(io::Error::from(kind)),
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.reads.push_front(ReadStep::Data(rest));
                }
                self.probe.bytes_read.fetch_add(n, Ordering::SeqCst);
                Ok(n)
            }
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = self.probe.written.lock().unwrap();

        let mut n = buf.len();
        if let Some(limit) = self.write_limit {
            let remaining = limit.saturating_sub(written.len());
            if remaining == 0 {
                return match self.write_error {
                    Some(kind) => Err(io::Error::from(kind)),
                    None => Ok(0),
                };
            }
            n = n.min(remaining);
        }
        if let Some(chunk) = self.write_chunk {
            n = n.min(chunk);
        }

        written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for MockStream {
    fn is_open(&self) -> bool {
        !self.probe.is_closed()
    }

    fn shutdown(&self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

/// A unique socket path under the temp directory.
pub fn unique_socket_path() -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "tc-unit-{}-{:x}-{}.sock",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}

/// Default peer behavior: PING → PONG, REQUEST → 200 echoing the body.
pub fn echo_response(request: &Message) -> Option<Message> {
    match request.message_type {
        MessageType::Ping => Some(Message::pong()),
        MessageType::Request => {
            let mut headers = HeaderMap::new();
            headers.insert("_statusCode".into(), json!(200));
            headers.insert("_statusMessage".into(), json!("OK"));
            if let Some(path) = request.headers.as_ref().and_then(|h| h.get("_path")) {
                headers.insert("x-path".into(), path.clone());
            }
            let mut response = Message::new(MessageType::Response).with_headers(headers);
            if let Some(body) = &request.body {
                response = response.with_body(body.clone());
            }
            Some(response)
        }
        _ => None,
    }
}

type Handler = dyn Fn(&Message) -> Option<Message> + Send + Sync;

/// A transcoder peer on a real Unix socket, one thread per connection.
///
/// The handler's `None` closes the connection.
pub struct FakeServer {
    path: PathBuf,
    accepted: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        let path = unique_socket_path();
        let listener = UnixListener::bind(&path).unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let handler: Arc<Handler> = Arc::new(handler);

        let counter = accepted.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                thread::spawn(move || serve(stream, &*handler));
            }
        });

        Self { path, accepted }
    }

    pub fn echo() -> Self {
        Self::start(echo_response)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn serve(mut stream: UnixStream, handler: &Handler) {
    while let Ok(request) = read_message(&mut stream, DEFAULT_MAX_MESSAGE_SIZE) {
        let Some(response) = handler(&request) else {
            return;
        };
        let Ok(bytes) = response.encode() else { return };
        if stream.write_all(&bytes).is_err() {
            return;
        }
    }
}
