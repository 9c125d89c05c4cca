//! Error types for the codec layer.
//!
//! Each crate in Satchel defines its own error enum. When you see a
//! `CodecError`, the problem is in turning a value into a signed cookie
//! string (or back), not in storage or request handling.

/// Errors that can occur while encoding or decoding a signed value.
///
/// The variants mirror the checks [`SecureCookie::decode`] performs, in
/// the order it performs them, so a log line tells you exactly which
/// step rejected a cookie.
///
/// [`SecureCookie::decode`]: crate::SecureCookie::decode
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A codec was built with an empty hash key. Signing with an empty
    /// key would make every cookie forgeable.
    #[error("hash key is not set")]
    HashKeyNotSet,

    /// A block (encryption) key shorter than 32 bytes. Encryption keys are
    /// derived from it, and a short master key makes them guessable.
    #[error("block key must be at least 32 bytes, got {len}")]
    InvalidBlockKey { len: usize },

    /// `encode_multi` / `decode_multi` were called with no codecs.
    #[error("no codecs were provided")]
    NoCodecs,

    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (turning bytes back into a Rust value).
    ///
    /// The signature was valid, so this usually means the value was
    /// written by a different version of the application.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The encoded output is longer than the configured maximum length.
    #[error("the encoded value is too long ({len} > {max})")]
    EncodedValueTooLong { len: usize, max: usize },

    /// The input handed to `decode` is longer than the maximum length.
    #[error("the value is too long ({len} > {max})")]
    ValueTooLong { len: usize, max: usize },

    /// The input is not valid base64 (url-safe alphabet).
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded input does not have the `timestamp|payload|mac` shape.
    #[error("the value is not valid")]
    Malformed,

    /// The MAC does not match. The value was tampered with, was signed
    /// with another key, or was signed for another cookie name.
    #[error("the value is not valid: hash mismatch")]
    HashMismatch,

    /// The payload could not be encrypted.
    #[error("the value could not be encrypted")]
    Encrypt,

    /// The signature was valid but the payload did not decrypt: it was
    /// encrypted with another block key (or not encrypted at all).
    #[error("the value could not be decrypted")]
    Decrypt,

    /// The timestamp field is not a number.
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// The value was signed more recently than `min_age` allows.
    #[error("timestamp is too new")]
    TimestampTooNew,

    /// The value was signed longer ago than `max_age` allows.
    #[error("expired timestamp")]
    TimestampExpired,

    /// Every codec in a `decode_multi` call failed. Holds one error per
    /// codec, in codec order.
    #[error("all {} codecs failed; first error: {}", .0.len(), first_of(.0))]
    Multi(Vec<CodecError>),
}

impl CodecError {
    /// Returns `true` if this error (or, for [`CodecError::Multi`], any
    /// inner error) reports an expired timestamp.
    pub fn is_expired(&self) -> bool {
        match self {
            Self::TimestampExpired => true,
            Self::Multi(errors) => errors.iter().any(Self::is_expired),
            _ => false,
        }
    }
}

fn first_of(errors: &[CodecError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}
