//! HTTP-style request and response values carried inside envelopes.
//!
//! The transcoder exposes an HTTP-like API over the socket: a request's
//! method, path and query travel as reserved `_`-prefixed keys in the JSON
//! header block, and status lines come back the same way.

mod method;
mod request;
mod response;

pub use method::Method;
pub use request::Request;
pub use response::Response;
