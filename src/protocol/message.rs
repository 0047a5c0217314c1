//! Message struct and envelope encoding.
//!
//! A [`Message`] is one decoded envelope: its type plus the optional header
//! block and body block. The flags byte is derived from which blocks are
//! present, so a `Message` can never disagree with its own framing.
//!
//! # Example
//!
//! ```
//! use transcoder_client::protocol::{decode_message, Message, MessageType, DEFAULT_MAX_MESSAGE_SIZE};
//! use bytes::Bytes;
//!
//! let message = Message::new(MessageType::Response).with_body(Bytes::from_static(b"ok"));
//! let bytes = message.encode().unwrap();
//!
//! let decoded = decode_message(&bytes, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
//! assert_eq!(decoded, message);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    flags, FixedHeader, HeaderMap, MessageType, BODY_LENGTH_SIZE, HEADERS_LENGTH_SIZE, HEADER_SIZE,
};
use crate::codec::JsonCodec;
use crate::error::{Result, TranscoderError};

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    /// Header block, present iff `HAS_HEADERS`.
    pub headers: Option<HeaderMap>,
    /// Body block, present iff `HAS_BODY`. An empty body is distinct from no body.
    pub body: Option<Bytes>,
}

impl Message {
    /// Create a message with neither headers nor body.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            headers: None,
            body: None,
        }
    }

    /// A zero-payload PING.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping)
    }

    /// A zero-payload PONG.
    pub fn pong() -> Self {
        Self::new(MessageType::Pong)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Flags byte implied by the present blocks.
    pub fn flags(&self) -> u8 {
        let mut bits = flags::NONE;
        if self.headers.is_some() {
            bits |= flags::HAS_HEADERS;
        }
        if self.body.is_some() {
            bits |= flags::HAS_BODY;
        }
        bits
    }

    /// Get the body bytes, or an empty slice when there is no body.
    #[inline]
    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    /// Encode this message into a single contiguous buffer.
    pub fn encode(&self) -> Result<BytesMut> {
        encode_message(
            self.message_type,
            self.flags(),
            self.headers.as_ref(),
            self.body.as_deref(),
        )
    }
}

/// Encode an envelope.
///
/// Layout: fixed header, then (if `HAS_HEADERS`) header length + JSON, then
/// (if `HAS_BODY`) body length + body. Blocks whose flag is not set are not
/// written even if supplied.
///
/// # Errors
///
/// Returns `TranscoderError::Encoding` if reserved flag bits are set, if a
/// flag is set but the matching block is missing, or if the header block is
/// too long for its 32-bit length prefix.
pub fn encode_message(
    message_type: MessageType,
    message_flags: u8,
    headers: Option<&HeaderMap>,
    body: Option<&[u8]>,
) -> Result<BytesMut> {
    if message_flags & flags::RESERVED_MASK != 0 {
        return Err(TranscoderError::Encoding(format!(
            "reserved flag bits must be zero (flags = 0x{:02X})",
            message_flags
        )));
    }

    let headers_json = if flags::has_flag(message_flags, flags::HAS_HEADERS) {
        let headers = headers.ok_or_else(|| {
            TranscoderError::Encoding("HAS_HEADERS is set but no headers were given".to_string())
        })?;
        Some(JsonCodec::encode(headers)?)
    } else {
        None
    };

    let body = if flags::has_flag(message_flags, flags::HAS_BODY) {
        Some(body.ok_or_else(|| {
            TranscoderError::Encoding("HAS_BODY is set but no body was given".to_string())
        })?)
    } else {
        None
    };

    let capacity = HEADER_SIZE
        + headers_json
            .as_ref()
            .map_or(0, |json| HEADERS_LENGTH_SIZE + json.len())
        + body.map_or(0, |body| BODY_LENGTH_SIZE + body.len());
    let mut buf = BytesMut::with_capacity(capacity);

    buf.put_slice(&FixedHeader::new(message_type, message_flags).encode());

    if let Some(json) = headers_json {
        let len = u32::try_from(json.len()).map_err(|_| {
            TranscoderError::Encoding(format!(
                "header block of {} bytes exceeds the 32-bit length field",
                json.len()
            ))
        })?;
        buf.put_u32(len);
        buf.put_slice(&json);
    }

    if let Some(body) = body {
        buf.put_u64(body.len() as u64);
        buf.put_slice(body);
    }

    Ok(buf)
}
