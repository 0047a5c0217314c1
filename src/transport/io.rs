//! Exact-length reads and full writes over blocking streams.
//!
//! `std::io::Read::read_exact` loses the number of bytes received before a
//! failure, and `write_all` hides partial progress. Both counts are part of
//! the error contract here, so the loops are written out.

use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;

use crate::error::{ProtocolError, ReadError, Result, WriteError};
use crate::protocol::{
    check_length, decode_headers, FixedHeader, Message, BODY_LENGTH_SIZE, HEADERS_LENGTH_SIZE,
    HEADER_SIZE,
};

/// Fill `buf` completely.
///
/// - EOF before `buf` is full: `ReadError::ConnectionClosed`
/// - read timeout: `ReadError::Timeout` with the count received so far
/// - `Interrupted` is retried
pub fn read_exact_counted<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::result::Result<(), ReadError> {
    let expected = buf.len();
    let mut filled = 0;

    while filled < expected {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(ReadError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ReadError::Timeout {
                    expected,
                    actual: filled,
                });
            }
            Err(e) => return Err(ReadError::Failed(e.to_string())),
        }
    }

    Ok(())
}

/// Write all of `buf`, then flush.
///
/// A write that stops after partial progress is `WriteError::Incomplete`;
/// the stream is no longer aligned and must be closed.
pub fn write_full<W: Write + ?Sized>(
    writer: &mut W,
    buf: &[u8],
) -> std::result::Result<(), WriteError> {
    let expected = buf.len();
    let mut written = 0;

    while written < expected {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(WriteError::Incomplete {
                    expected,
                    actual: written,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) if written > 0 => {
                return Err(WriteError::Incomplete {
                    expected,
                    actual: written,
                })
            }
            Err(e) => return Err(WriteError::Failed(e.to_string())),
        }
    }

    writer
        .flush()
        .map_err(|e| WriteError::Failed(format!("flush: {e}")))
}

/// Read one complete message: fixed header, then each announced block.
///
/// Declared lengths are checked against `max_message_size` before the
/// block is allocated or read. Framing errors leave the stream unaligned.
pub fn read_message<R: Read + ?Sized>(reader: &mut R, max_message_size: u64) -> Result<Message> {
    let mut raw = [0u8; HEADER_SIZE];
    read_exact_counted(reader, &mut raw)?;
    let header = FixedHeader::decode(&raw)?;

    let mut message = Message::new(header.message_type);

    if header.has_headers() {
        let mut len = [0u8; HEADERS_LENGTH_SIZE];
        read_exact_counted(reader, &mut len)?;
        let length = block_length(u32::from_be_bytes(len).into(), max_message_size)?;

        let mut block = vec![0u8; length];
        read_exact_counted(reader, &mut block)?;
        message.headers = Some(decode_headers(&block)?);
    }

    if header.has_body() {
        let mut len = [0u8; BODY_LENGTH_SIZE];
        read_exact_counted(reader, &mut len)?;
        let length = block_length(u64::from_be_bytes(len), max_message_size)?;

        let mut block = vec![0u8; length];
        read_exact_counted(reader, &mut block)?;
        message.body = Some(Bytes::from(block));
    }

    Ok(message)
}

/// A declared block length, bounded and addressable on this target.
fn block_length(declared: u64, max: u64) -> std::result::Result<usize, ProtocolError> {
    check_length(declared, max)?;
    usize::try_from(declared).map_err(|_| ProtocolError::MessageTooLarge { declared, max })
}
