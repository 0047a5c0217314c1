//! Wire format encoding and decoding.
//!
//! Implements the 8-byte fixed header:
//! ```text
//! ┌──────────┬─────────┬────────┬───────┬──────────┐
//! │ Magic    │ Version │ Type   │ Flags │ Reserved │
//! │ 4 bytes  │ 1 byte  │ 1 byte │ 1 byte│ 1 byte   │
//! │ uint32 BE│         │        │       │ always 0 │
//! └──────────┴─────────┴────────┴───────┴──────────┘
//! ```
//!
//! Followed by the optional blocks, in this order:
//! - `HAS_HEADERS`: `uint32 BE` length + UTF-8 JSON object
//! - `HAS_BODY`: `uint64 BE` length + raw bytes
//!
//! All multi-byte integers are Big Endian.

use crate::codec::JsonCodec;
use crate::error::ProtocolError;

/// Protocol magic (`"TRNS"`).
pub const PROTOCOL_MAGIC: u32 = 0x5452_4E53;

/// The single supported protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size in bytes (exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Size of the header block length prefix.
pub const HEADERS_LENGTH_SIZE: usize = 4;

/// Size of the body block length prefix.
pub const BODY_LENGTH_SIZE: usize = 8;

/// Default maximum size of a single header or body block (100 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 100 * 1024 * 1024;

/// JSON object carried in the header block.
pub type HeaderMap = serde_json::Map<String, serde_json::Value>;

/// Flag constants for the protocol.
pub mod flags {
    /// A length-prefixed JSON header block follows the fixed header.
    pub const HAS_HEADERS: u8 = 0b0000_0001;
    /// A length-prefixed body block follows.
    pub const HAS_BODY: u8 = 0b0000_0010;

    /// Reserved bits mask (bits 2-7).
    pub const RESERVED_MASK: u8 = 0b1111_1100;

    /// No optional blocks.
    pub const NONE: u8 = 0;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Message category. The codes are a fixed contract with the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 0x01,
    Response = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    /// Failure report from the peer; headers carry `_code`, `_message`, `_details`.
    Error = 0x05,
}

impl MessageType {
    /// The wire code for this type.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::Request => "REQUEST",
            MessageType::Response => "RESPONSE",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Error => "ERROR",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> std::result::Result<Self, ProtocolError> {
        match code {
            0x01 => Ok(MessageType::Request),
            0x02 => Ok(MessageType::Response),
            0x03 => Ok(MessageType::Ping),
            0x04 => Ok(MessageType::Pong),
            0x05 => Ok(MessageType::Error),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub magic: u32,
    pub version: u8,
    pub message_type: MessageType,
    /// Flags byte with reserved bits cleared (see `flags` module).
    pub flags: u8,
}

impl FixedHeader {
    /// Create a header for the current protocol version.
    pub fn new(message_type: MessageType, flags: u8) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            message_type,
            flags,
        }
    }

    /// Encode header to bytes (Big Endian). The reserved byte is always zero.
    ///
    /// # Example
    ///
    /// ```
    /// use transcoder_client::protocol::{flags, FixedHeader, MessageType};
    ///
    /// let header = FixedHeader::new(MessageType::Ping, flags::NONE);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [0x54, 0x52, 0x4E, 0x53, 1, 0x03, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4] = self.version;
        buf[5] = self.message_type.code();
        buf[6] = self.flags;
        buf[7] = 0;
    }

    /// Decode and validate a header.
    ///
    /// Checks, in order: magic, version, message type. Reserved flag bits
    /// and the reserved byte are ignored.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> std::result::Result<Self, ProtocolError> {
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != PROTOCOL_MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = buf[4];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let message_type = MessageType::try_from(buf[5])?;

        Ok(Self {
            magic,
            version,
            message_type,
            flags: buf[6] & !flags::RESERVED_MASK,
        })
    }

    #[inline]
    pub fn has_headers(&self) -> bool {
        flags::has_flag(self.flags, flags::HAS_HEADERS)
    }

    #[inline]
    pub fn has_body(&self) -> bool {
        flags::has_flag(self.flags, flags::HAS_BODY)
    }
}

/// Decode a fixed header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8; HEADER_SIZE]) -> std::result::Result<FixedHeader, ProtocolError> {
    FixedHeader::decode(buf)
}

/// Reject a declared block length larger than `max`.
///
/// Called before any bytes of the block are read or allocated.
#[inline]
pub fn check_length(declared: u64, max: u64) -> std::result::Result<(), ProtocolError> {
    if declared > max {
        return Err(ProtocolError::MessageTooLarge { declared, max });
    }
    Ok(())
}

/// Decode a header block. The bytes must be a JSON object.
pub fn decode_headers(bytes: &[u8]) -> std::result::Result<HeaderMap, ProtocolError> {
    match JsonCodec::decode::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProtocolError::InvalidHeadersJson(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ProtocolError::InvalidHeadersJson(e.to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
