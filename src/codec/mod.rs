//! Codec module - serialization for header blocks and bodies.
//!
//! - [`JsonCodec`] - JSON via `serde_json`, used for every header block and
//!   for JSON request/response bodies
//!
//! Binary bodies (playlists, media control payloads) are carried as raw
//! `bytes::Bytes` and never pass through a codec.

mod json;

pub use json::JsonCodec;
