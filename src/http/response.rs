use std::borrow::Cow;
use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::{ResponseError, Result};
use crate::protocol::{HeaderMap, Message, MessageType};

/// A decoded reply from the transcoder.
///
/// Header values are normalized to strings; `_statusCode` and
/// `_statusMessage` are lifted out of the header block.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    message_type: MessageType,
    flags: u8,
    status_code: u16,
    status_message: String,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
}

impl Response {
    /// Interpret a reply envelope.
    ///
    /// - RESPONSE: status is read from `_statusCode` (default 200) and
    ///   `_statusMessage` (default `OK`)
    /// - ERROR: fails with `ResponseError::Server`
    /// - anything else: kept as-is with status 200 and no headers
    pub fn from_message(message: Message) -> Result<Self> {
        let flags = message.flags();
        let Message {
            message_type,
            headers,
            body,
        } = message;
        let mut headers = headers.unwrap_or_default();

        match message_type {
            MessageType::Response => {
                let status_code = headers
                    .remove("_statusCode")
                    .map_or(200, |v| status_from_value(&v));
                let status_message = headers
                    .remove("_statusMessage")
                    .map_or_else(|| "OK".to_string(), |v| header_string(&v));

                Ok(Self {
                    message_type,
                    flags,
                    status_code,
                    status_message,
                    headers: normalize_headers(headers),
                    body,
                })
            }
            MessageType::Error => Err(server_error(&mut headers).into()),
            _ => Ok(Self {
                message_type,
                flags,
                status_code: 200,
                status_message: "OK".to_string(),
                headers: BTreeMap::new(),
                body,
            }),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header lookup, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Body bytes, empty when there is no body block.
    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Body as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }

    /// Decode the body as JSON. A missing body decodes as `null`, so
    /// `Option<T>` targets yield `None`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.body.as_deref().unwrap_or(&b"null"[..]);
        JsonCodec::decode(bytes).map_err(|e| {
            ResponseError::InvalidBody(format!("invalid JSON in response body: {e}")).into()
        })
    }

    /// `content-length` header if parseable, otherwise the body length.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(|| self.body().len())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// 3xx
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// 4xx
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// 5xx
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

fn server_error(headers: &mut HeaderMap) -> ResponseError {
    let code = headers
        .remove("_code")
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0);
    let message = headers
        .remove("_message")
        .map_or_else(|| "Unknown error".to_string(), |v| header_string(&v));
    let details = headers.remove("_details").filter(|v| !v.is_null());

    ResponseError::Server {
        code,
        message,
        details,
    }
}

/// Status code from a number or numeric string. Anything else is 0, which
/// no status class accepts as success.
fn status_from_value(value: &Value) -> u16 {
    let code = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    code.and_then(|c| u16::try_from(c).ok()).unwrap_or(0)
}

fn normalize_headers(headers: HeaderMap) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .map(|(key, value)| {
            let value = header_string(&value);
            (key, value)
        })
        .collect()
}

/// Render a header value as a string. Arrays collapse to their first element.
fn header_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.first().map(header_string).unwrap_or_default(),
        other => other.to_string(),
    }
}
