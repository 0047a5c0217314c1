//! Protocol module - wire format, envelope encoding, and incremental decoding.
//!
//! This module implements the binary envelope exchanged with the transcoder:
//! - 8-byte fixed header encoding/decoding
//! - Message struct with optional JSON header block and raw body block
//! - Message buffer for accumulating partial reads

mod message;
mod message_buffer;
mod wire_format;

pub use message::{encode_message, Message};
pub use message_buffer::{decode_message, MessageBuffer};
pub use wire_format::{
    check_length, decode_header, decode_headers, flags, FixedHeader, HeaderMap, MessageType,
    BODY_LENGTH_SIZE, DEFAULT_MAX_MESSAGE_SIZE, HEADERS_LENGTH_SIZE, HEADER_SIZE, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};
