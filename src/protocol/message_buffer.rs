//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented envelopes:
//! - `WaitingForHeader`: need the 8-byte fixed header
//! - `WaitingForHeadersLength` / `WaitingForHeaders`: header block
//! - `WaitingForBodyLength` / `WaitingForBody`: body block
//!
//! Every declared length is checked against the maximum before the state
//! machine waits for (and buffers) the block it announces.
//!
//! # Example
//!
//! ```
//! use transcoder_client::protocol::{Message, MessageBuffer};
//!
//! let bytes = Message::pong().encode().unwrap();
//! let mut buffer = MessageBuffer::new();
//!
//! // Data arrives in arbitrary chunks
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let messages = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(messages, vec![Message::pong()]);
//! ```

use bytes::{Buf, BytesMut};

use super::wire_format::{
    check_length, decode_headers, FixedHeader, HeaderMap, BODY_LENGTH_SIZE,
    DEFAULT_MAX_MESSAGE_SIZE, HEADERS_LENGTH_SIZE, HEADER_SIZE,
};
use super::Message;
use crate::error::{ProtocolError, Result};

/// State machine for envelope parsing.
#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForHeadersLength {
        header: FixedHeader,
    },
    WaitingForHeaders {
        header: FixedHeader,
        length: usize,
    },
    WaitingForBodyLength {
        header: FixedHeader,
        headers: Option<HeaderMap>,
    },
    WaitingForBody {
        header: FixedHeader,
        headers: Option<HeaderMap>,
        length: usize,
    },
}

/// Outcome of one state transition.
enum Step {
    NeedMore(State),
    Next(State),
    Complete(Message),
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
///
/// After an error the buffer is no longer aligned with the stream and must
/// be discarded (or [`clear`](Self::clear)ed together with the stream).
pub struct MessageBuffer {
    buffer: BytesMut,
    state: State,
    max_message_size: u64,
}

impl MessageBuffer {
    /// Create a new buffer with default settings.
    ///
    /// Default capacity: 64KB, max block size: 100 MiB.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a new buffer with a custom maximum block size.
    pub fn with_max_message_size(max_message_size: u64) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` on an invalid fixed header, an oversized
    /// block, or a header block that is not a JSON object.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Message>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }

        Ok(messages)
    }

    /// Try to extract a single message from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(message))` if a complete message was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Message>> {
        loop {
            let state = std::mem::replace(&mut self.state, State::WaitingForHeader);
            match self.advance(state)? {
                Step::NeedMore(state) => {
                    self.state = state;
                    return Ok(None);
                }
                Step::Next(state) => self.state = state,
                Step::Complete(message) => return Ok(Some(message)),
            }
        }
    }

    /// Run one transition of the state machine.
    fn advance(&mut self, state: State) -> Result<Step> {
        match state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(Step::NeedMore(State::WaitingForHeader));
                }

                let mut raw = [0u8; HEADER_SIZE];
                self.buffer.copy_to_slice(&mut raw);
                let header = FixedHeader::decode(&raw)?;

                if header.has_headers() {
                    Ok(Step::Next(State::WaitingForHeadersLength { header }))
                } else {
                    Ok(Self::after_headers(header, None))
                }
            }

            State::WaitingForHeadersLength { header } => {
                if self.buffer.len() < HEADERS_LENGTH_SIZE {
                    return Ok(Step::NeedMore(State::WaitingForHeadersLength { header }));
                }

                let length = self.buffer.get_u32() as u64;
                check_length(length, self.max_message_size)?;

                Ok(Step::Next(State::WaitingForHeaders {
                    header,
                    length: length as usize,
                }))
            }

            State::WaitingForHeaders { header, length } => {
                if self.buffer.len() < length {
                    return Ok(Step::NeedMore(State::WaitingForHeaders { header, length }));
                }

                let raw = self.buffer.split_to(length);
                let headers = decode_headers(&raw)?;

                Ok(Self::after_headers(header, Some(headers)))
            }

            State::WaitingForBodyLength { header, headers } => {
                if self.buffer.len() < BODY_LENGTH_SIZE {
                    return Ok(Step::NeedMore(State::WaitingForBodyLength { header, headers }));
                }

                let length = self.buffer.get_u64();
                check_length(length, self.max_message_size)?;
                let length = usize::try_from(length).map_err(|_| ProtocolError::MessageTooLarge {
                    declared: length,
                    max: self.max_message_size,
                })?;

                Ok(Step::Next(State::WaitingForBody {
                    header,
                    headers,
                    length,
                }))
            }

            State::WaitingForBody {
                header,
                headers,
                length,
            } => {
                if self.buffer.len() < length {
                    return Ok(Step::NeedMore(State::WaitingForBody {
                        header,
                        headers,
                        length,
                    }));
                }

                // Zero-copy freeze
                let body = self.buffer.split_to(length).freeze();
                Ok(Step::Complete(Message {
                    message_type: header.message_type,
                    headers,
                    body: Some(body),
                }))
            }
        }
    }

    fn after_headers(header: FixedHeader, headers: Option<HeaderMap>) -> Step {
        if header.has_body() {
            Step::Next(State::WaitingForBodyLength { header, headers })
        } else {
            Step::Complete(Message {
                message_type: header.message_type,
                headers,
                body: None,
            })
        }
    }

    /// Total bytes the current state waits for before it can move on.
    fn needed(&self) -> usize {
        match &self.state {
            State::WaitingForHeader => HEADER_SIZE,
            State::WaitingForHeadersLength { .. } => HEADERS_LENGTH_SIZE,
            State::WaitingForHeaders { length, .. } => *length,
            State::WaitingForBodyLength { .. } => BODY_LENGTH_SIZE,
            State::WaitingForBody { length, .. } => *length,
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True if no message is partially decoded.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::WaitingForHeader) && self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForHeadersLength { .. } => "WaitingForHeadersLength",
            State::WaitingForHeaders { .. } => "WaitingForHeaders",
            State::WaitingForBodyLength { .. } => "WaitingForBodyLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode exactly one complete message from `bytes`.
///
/// # Errors
///
/// Returns `ProtocolError::Truncated` if `bytes` ends mid-message; trailing
/// bytes after the first message are ignored.
pub fn decode_message(bytes: &[u8], max_message_size: u64) -> Result<Message> {
    let mut buffer = MessageBuffer::with_max_message_size(max_message_size);
    buffer.buffer.extend_from_slice(bytes);

    match buffer.try_extract_one()? {
        Some(message) => Ok(message),
        None => {
            let needed = buffer.needed().saturating_sub(buffer.len()).max(1);
            Err(ProtocolError::Truncated { needed }.into())
        }
    }
}
