//! Transport module - blocking Unix domain socket connections.
//!
//! - [`Stream`]: the byte stream a transport runs over
//! - [`read_exact_counted`] / [`write_full`]: exact-length I/O with progress
//!   reported in errors
//! - [`read_message`]: read one envelope, checking lengths before allocating
//! - [`SocketTransport`]: one connection, one exchange at a time

mod io;
mod socket;
mod stream;

pub use io::{read_exact_counted, read_message, write_full};
pub use socket::SocketTransport;
pub use stream::Stream;
