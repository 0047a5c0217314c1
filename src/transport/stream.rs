//! Byte stream abstraction under [`SocketTransport`](super::SocketTransport).
//!
//! The transport is generic over this trait so framing can be exercised
//! against in-memory streams; production code uses `UnixStream`.

use std::io::{ErrorKind, Read, Write};
use std::mem::MaybeUninit;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use socket2::SockRef;

/// A blocking, full-duplex byte stream.
pub trait Stream: Read + Write + Send {
    /// Best-effort local liveness check.
    ///
    /// A `true` result does not guarantee the peer is alive; a peer that
    /// dies later is only discovered on the next read or write.
    fn is_open(&self) -> bool;

    /// Close both directions. Errors are ignored.
    fn shutdown(&self);
}

impl Stream for UnixStream {
    /// False after a pending socket error, a peer hangup, or unsolicited
    /// bytes waiting on an idle stream.
    ///
    /// `take_error` clears `SO_ERROR`; a stream that had one is reported
    /// closed and gets discarded, so the consumed error is never needed.
    fn is_open(&self) -> bool {
        if !matches!(self.take_error(), Ok(None)) {
            return false;
        }

        let mut byte = [MaybeUninit::<u8>::uninit(); 1];
        if self.set_nonblocking(true).is_err() {
            return false;
        }
        let peeked = SockRef::from(self).peek(&mut byte);
        if self.set_nonblocking(false).is_err() {
            return false;
        }

        match peeked {
            Err(e) => e.kind() == ErrorKind::WouldBlock,
            // 0 is EOF; anything else is stray data that would misalign the next reply.
            Ok(_) => false,
        }
    }

    fn shutdown(&self) {
        let _ = UnixStream::shutdown(self, Shutdown::Both);
    }
}
