//! Binary encoding for signed payloads.
//!
//! Token bodies are serialized with postcard and carried as URL-safe base64
//! without padding, so they fit in an `Authorization` header unescaped.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

/// Error type for codec operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// The text form was not valid base64url.
    #[snafu(display("Invalid base64url: {source}"))]
    Base64 {
        /// The underlying base64 error.
        source: base64::DecodeError,
    },
}

/// Encodes a value to bytes using postcard serialization.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).context(EncodeSnafu)
}

/// Decodes bytes to a value using postcard deserialization.
///
/// Trailing bytes after a complete value are rejected.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, rest) = postcard::take_from_bytes(bytes).context(DecodeSnafu)?;
    if !rest.is_empty() {
        return Err(CodecError::Decode { source: postcard::Error::DeserializeBadEncoding });
    }
    Ok(value)
}

/// Encodes a value with postcard and renders it as base64url text.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode_text<T: Serialize>(value: &T) -> Result<String, CodecError> {
    Ok(URL_SAFE_NO_PAD.encode(encode(value)?))
}

/// Inverse of [`encode_text`].
///
/// # Errors
///
/// Returns `CodecError::Base64` for invalid text and `CodecError::Decode`
/// for a payload that does not decode as `T`.
pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    let bytes = URL_SAFE_NO_PAD.decode(text).context(Base64Snafu)?;
    decode(&bytes)
}
