use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use super::Method;
use crate::error::{Result, TranscoderError};
use crate::protocol::{HeaderMap, Message, MessageType};

/// Header key carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An immutable request to the transcoder.
///
/// # Example
///
/// ```
/// use transcoder_client::http::{Method, Request};
///
/// let request = Request::get("/api/videos")?
///     .with_query("page=2")
///     .with_header("accept", "application/json");
///
/// assert_eq!(request.method(), Method::Get);
/// assert_eq!(request.uri(), "/api/videos?page=2");
/// # Ok::<(), transcoder_client::TranscoderError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
    query: Option<String>,
}

impl Request {
    /// Create a request. The path must start with `/`.
    pub fn new(method: Method, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(TranscoderError::InvalidRequest(format!(
                "path must start with \"/\": {path:?}"
            )));
        }

        Ok(Self {
            method,
            path,
            headers: BTreeMap::new(),
            body: None,
            query: None,
        })
    }

    /// Create a request from a method name such as `"POST"`.
    pub fn create(method: &str, path: impl Into<String>) -> Result<Self> {
        Self::new(method.parse()?, path)
    }

    pub fn get(path: impl Into<String>) -> Result<Self> {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::new(Method::Post, path)?.with_body(body))
    }

    pub fn put(path: impl Into<String>, body: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::new(Method::Put, path)?.with_body(body))
    }

    pub fn delete(path: impl Into<String>) -> Result<Self> {
        Self::new(Method::Delete, path)
    }

    pub fn head(path: impl Into<String>) -> Result<Self> {
        Self::new(Method::Head, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attach a body. An empty body is still sent as a body block.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the query string, without the leading `?`.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }

    /// Path plus `?query` when a non-empty query is set.
    pub fn uri(&self) -> String {
        match self.query() {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// The header block as sent: caller headers plus `_method`, `_path`,
    /// `_query` and a generated `x-request-id` unless one was supplied.
    pub fn headers_with_metadata(&self) -> HeaderMap {
        let mut map: HeaderMap = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        map.insert("_method".into(), Value::String(self.method.as_str().into()));
        map.insert("_path".into(), Value::String(self.path.clone()));
        if let Some(query) = self.query() {
            map.insert("_query".into(), Value::String(query.into()));
        }
        if !map.contains_key(REQUEST_ID_HEADER) {
            map.insert(REQUEST_ID_HEADER.into(), Value::String(generate_request_id()));
        }

        map
    }

    /// Build the REQUEST envelope. The header block is always present.
    pub fn to_message(&self) -> Result<Message> {
        let mut message =
            Message::new(MessageType::Request).with_headers(self.headers_with_metadata());
        if let Some(body) = &self.body {
            message = message.with_body(body.clone());
        }
        Ok(message)
    }
}

/// Request id from wall-clock nanos mixed with the process id.
fn generate_request_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mixed = (nanos ^ seq).wrapping_mul(0x517cc1b727220a95) ^ pid;
    format!("rs-{:x}-{:06x}", nanos, mixed & 0xff_ffff)
}
