//! Signed cookie values for Satchel.
//!
//! This crate decides how session data becomes a string a browser will
//! carry around, and makes sure it comes back unmodified:
//!
//! - **Serializer** ([`Serializer`] trait, [`JsonSerializer`]): how
//!   values are turned into bytes.
//! - **SecureCookie** ([`SecureCookie`], [`encode_multi`],
//!   [`decode_multi`]): HMAC-SHA256 signing, optional AES-GCM
//!   encryption, timestamps, size limits and key rotation.
//! - **Errors** ([`CodecError`]): what can go wrong along the way.
//!
//! # Architecture
//!
//! The codec layer knows nothing about HTTP, requests, or storage. Stores
//! decide WHAT to encode (the whole session, or only its id) and WHERE it
//! goes; this crate only turns it into signed text and back.
//!
//! ```text
//! Middleware (requests) → Store (where data lives) → Codec (signed text)
//! ```

mod codec;
mod error;
mod secure_cookie;

pub use codec::{JsonSerializer, Serializer};
pub use error::CodecError;
pub use secure_cookie::{
    DEFAULT_MAX_AGE, DEFAULT_MAX_LENGTH, KeyPair, MIN_BLOCK_KEY_LEN,
    SecureCookie, codecs_from_keys, codecs_from_pairs, decode_multi,
    encode_multi, generate_random_key,
};
