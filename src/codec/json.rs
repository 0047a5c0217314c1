//! JSON codec using `serde_json`.
//!
//! Used for the header block of every envelope and for JSON request and
//! response bodies. The peer is a Node.js service, so objects are plain
//! JSON maps and byte strings are not given any special treatment.
//!
//! # Example
//!
//! ```
//! use transcoder_client::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Skip {
//!     time: u32,
//! }
//!
//! let encoded = JsonCodec::encode(&Skip { time: 90 }).unwrap();
//! assert_eq!(encoded, br#"{"time":90}"#);
//!
//! let decoded: Skip = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Skip { time: 90 });
//! ```

use crate::error::{Result, TranscoderError};

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `TranscoderError::Encoding` if the value cannot be serialized
    /// (for example a map with non-string keys).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| TranscoderError::Encoding(e.to_string()))
    }

    /// Decode JSON bytes to a value.
    ///
    /// The raw `serde_json` error is returned so callers can attach it to
    /// the error kind that fits their context.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(
        bytes: &[u8],
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
