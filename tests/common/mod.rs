//! Fake transcoder peer for integration tests.

use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::{json, Value};
use transcoder_client::protocol::{HeaderMap, Message, MessageType, DEFAULT_MAX_MESSAGE_SIZE};
use transcoder_client::transport::read_message;

/// What the peer does with one request.
pub enum Reply {
    Message(Message),
    /// Raw bytes written as-is, for malformed envelopes.
    Raw(Vec<u8>),
    /// Close the connection without answering.
    Close,
}

pub struct TranscoderPeer {
    path: PathBuf,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<HeaderMap>>>,
}

impl TranscoderPeer {
    /// Start a peer with the routes in [`route`].
    pub fn start() -> Self {
        let path = unique_socket_path();
        let listener = UnixListener::bind(&path).unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (counter, log) = (accepted.clone(), requests.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let log = log.clone();
                thread::spawn(move || serve(stream, &log));
            }
        });

        Self {
            path,
            accepted,
            requests,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Header blocks of every REQUEST received, in arrival order.
    pub fn requests(&self) -> Vec<HeaderMap> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TranscoderPeer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn serve(mut stream: UnixStream, log: &Mutex<Vec<HeaderMap>>) {
    while let Ok(request) = read_message(&mut stream, DEFAULT_MAX_MESSAGE_SIZE) {
        if let Some(headers) = &request.headers {
            log.lock().unwrap().push(headers.clone());
        }

        let bytes = match route(&request) {
            Reply::Message(message) => message.encode().unwrap().to_vec(),
            Reply::Raw(bytes) => bytes,
            Reply::Close => return,
        };
        if stream.write_all(&bytes).is_err() {
            return;
        }
    }
}

fn response(status: u16, headers: Value, body: Option<Vec<u8>>) -> Reply {
    let Value::Object(mut map) = headers else {
        panic!("headers must be an object")
    };
    map.insert("_statusCode".into(), json!(status));
    let mut message = Message::new(MessageType::Response).with_headers(map);
    if let Some(body) = body {
        message = message.with_body(Bytes::from(body));
    }
    Reply::Message(message)
}

/// A small slice of the transcoder API.
fn route(request: &Message) -> Reply {
    if request.message_type == MessageType::Ping {
        return Reply::Message(Message::pong());
    }

    let headers = request.headers.clone().unwrap_or_default();
    let method = headers.get("_method").and_then(Value::as_str).unwrap_or("");
    let path = headers.get("_path").and_then(Value::as_str).unwrap_or("");

    match (method, path) {
        ("GET", "/api/health") => response(
            200,
            json!({"content-type": "application/json"}),
            Some(br#"{"status":"healthy","version":"2.1.0"}"#.to_vec()),
        ),
        ("POST", "/api/transcode/start") => {
            let options: Value = serde_json::from_slice(request.body()).unwrap_or(Value::Null);
            let job = json!({"jobId": "job-1", "videoId": options["videoId"], "status": "running"});
            response(201, json!({}), Some(job.to_string().into_bytes()))
        }
        ("GET", "/api/hls/abc/master.m3u8") => response(
            200,
            json!({"content-type": ["application/vnd.apple.mpegurl"]}),
            Some(b"#EXTM3U\n#EXT-X-VERSION:3\n".to_vec()),
        ),
        ("HEAD", "/api/video/abc") => response(200, json!({}), None),
        ("DELETE", "/api/session/s1") => response(204, json!({}), None),
        ("GET", "/api/broken") => {
            let Value::Object(map) = json!({
                "_code": 1001,
                "_message": "ffmpeg exited",
                "_details": {"exitCode": 1}
            }) else {
                unreachable!()
            };
            Reply::Message(Message::new(MessageType::Error).with_headers(map))
        }
        ("GET", "/api/garbage") => Reply::Raw(b"HTTP/1.1 500 Internal Server Error\r\n\r\n".to_vec()),
        ("GET", "/api/huge") => response(200, json!({}), Some(vec![b'x'; 4096])),
        ("GET", "/api/hangup") => Reply::Close,
        ("GET", "/api/slow") => {
            thread::sleep(Duration::from_millis(400));
            response(200, json!({}), None)
        }
        _ => response(
            404,
            json!({"_statusMessage": "Not Found"}),
            Some(br#"{"error":"no route"}"#.to_vec()),
        ),
    }
}

fn unique_socket_path() -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "tc-it-{}-{:x}-{}.sock",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}
