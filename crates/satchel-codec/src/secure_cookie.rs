//! Signed, timestamped cookie values.
//!
//! A [`SecureCookie`] turns any serde value into a string that is safe to
//! put in a cookie, and refuses to turn it back if anybody touched it.
//!
//! # Format
//!
//! ```text
//! payload = base64url(serialize(value))
//! payload = encrypt(block_key, name, payload)        (block key set)
//! mac     = HMAC-SHA256(hash_key, "name|timestamp|payload")
//! cookie  = base64url("timestamp|payload|mac")
//! ```
//!
//! Encryption is AES-256-GCM through the `cookie` crate's private jar,
//! with the cookie name as associated data. The MAC still covers the
//! ciphertext, so a wrong block key only shows up after the signature
//! checks out.
//!
//! The cookie name is part of the MAC but not of the output, so a value
//! signed for cookie `a` can't be replayed as cookie `b`. The timestamp
//! (unix seconds at signing time) is what `max_age` / `min_age` check.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use cookie::{Cookie, CookieJar, Key};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

use crate::{CodecError, JsonSerializer, Serializer};

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age of a signed value: 30 days, in seconds.
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// Shortest block key accepted by [`SecureCookie::with_block_key`].
pub const MIN_BLOCK_KEY_LEN: usize = 32;

/// Default maximum length of an encoded value. Browsers cap a cookie at
/// roughly 4 KiB including its name and attributes.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// Signs and verifies cookie values with a single hash key, and
/// optionally encrypts them with a block key.
///
/// Build one per key with [`SecureCookie::new`] (or several with
/// [`codecs_from_keys`] / [`codecs_from_pairs`] for key rotation). All limits use `0` to mean
/// "disabled":
///
/// | limit        | default   | checked on |
/// |--------------|-----------|------------|
/// | `max_age`    | 30 days   | decode     |
/// | `min_age`    | 0         | decode     |
/// | `max_length` | 4096      | both       |
///
/// ## Example
///
/// ```rust
/// use satchel_codec::SecureCookie;
///
/// let codec = SecureCookie::new(b"a very secret hash key".to_vec()).unwrap();
///
/// let encoded = codec.encode("session", &42u32).unwrap();
/// let decoded: u32 = codec.decode("session", &encoded).unwrap();
/// assert_eq!(decoded, 42);
///
/// // Same bytes, different cookie name: rejected.
/// assert!(codec.decode::<u32>("other", &encoded).is_err());
/// ```
#[derive(Clone)]
pub struct SecureCookie<S = JsonSerializer> {
    hash_key: Vec<u8>,
    block_key: Option<Key>,
    max_age: i64,
    min_age: i64,
    max_length: usize,
    serializer: S,
}

impl SecureCookie<JsonSerializer> {
    /// Creates a codec that signs with `hash_key` and serializes as JSON.
    ///
    /// # Errors
    /// Returns [`CodecError::HashKeyNotSet`] if the key is empty.
    pub fn new(hash_key: impl Into<Vec<u8>>) -> Result<Self, CodecError> {
        Self::with_serializer(hash_key, JsonSerializer)
    }
}

impl<S: Serializer> SecureCookie<S> {
    /// Creates a codec with a custom [`Serializer`].
    ///
    /// # Errors
    /// Returns [`CodecError::HashKeyNotSet`] if the key is empty.
    pub fn with_serializer(
        hash_key: impl Into<Vec<u8>>,
        serializer: S,
    ) -> Result<Self, CodecError> {
        let hash_key = hash_key.into();
        if hash_key.is_empty() {
            return Err(CodecError::HashKeyNotSet);
        }
        Ok(Self {
            hash_key,
            block_key: None,
            max_age: DEFAULT_MAX_AGE,
            min_age: 0,
            max_length: DEFAULT_MAX_LENGTH,
            serializer,
        })
    }

    /// Encrypts payloads with a key derived from `block_key` before they
    /// are signed.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidBlockKey`] if the key is shorter than
    /// [`MIN_BLOCK_KEY_LEN`] bytes.
    pub fn with_block_key(mut self, block_key: &[u8]) -> Result<Self, CodecError> {
        if block_key.len() < MIN_BLOCK_KEY_LEN {
            return Err(CodecError::InvalidBlockKey {
                len: block_key.len(),
            });
        }
        self.block_key = Some(Key::derive_from(block_key));
        Ok(self)
    }

    /// Whether payloads are encrypted as well as signed.
    pub fn is_encrypted(&self) -> bool {
        self.block_key.is_some()
    }

    /// Oldest signature (in seconds) `decode` accepts. `0` disables.
    pub fn set_max_age(&mut self, secs: i64) {
        self.max_age = secs;
    }

    /// Youngest signature (in seconds) `decode` accepts. `0` disables.
    pub fn set_min_age(&mut self, secs: i64) {
        self.min_age = secs;
    }

    /// Longest encoded value accepted or produced. `0` disables.
    pub fn set_max_length(&mut self, len: usize) {
        self.max_length = len;
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn min_age(&self) -> i64 {
        self.min_age
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Serializes, signs and frames `value` for the cookie `name`.
    ///
    /// # Errors
    /// - [`CodecError::Encode`]: the value could not be serialized
    /// - [`CodecError::EncodedValueTooLong`]: output exceeds `max_length`
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<String, CodecError> {
        self.encode_at(name, value, unix_now())
    }

    /// Verifies and decodes a value produced by [`encode`](Self::encode)
    /// for the same cookie `name`.
    ///
    /// # Errors
    /// One variant per failed check, see [`CodecError`].
    pub fn decode<T: DeserializeOwned>(
        &self,
        name: &str,
        value: &str,
    ) -> Result<T, CodecError> {
        self.decode_at(name, value, unix_now())
    }

    pub(crate) fn encode_at<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        now: i64,
    ) -> Result<String, CodecError> {
        let mut payload = URL_SAFE.encode(self.serializer.serialize(value)?);
        if let Some(key) = &self.block_key {
            payload = encrypt(key, name, payload)?;
        }
        let timestamp = now.to_string();

        let mac = self.sign(name, timestamp.as_bytes(), payload.as_bytes())?;

        let mut framed =
            Vec::with_capacity(timestamp.len() + payload.len() + mac.len() + 2);
        framed.extend_from_slice(timestamp.as_bytes());
        framed.push(b'|');
        framed.extend_from_slice(payload.as_bytes());
        framed.push(b'|');
        framed.extend_from_slice(&mac);

        let encoded = URL_SAFE.encode(framed);
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CodecError::EncodedValueTooLong {
                len: encoded.len(),
                max: self.max_length,
            });
        }
        Ok(encoded)
    }

    pub(crate) fn decode_at<T: DeserializeOwned>(
        &self,
        name: &str,
        value: &str,
        now: i64,
    ) -> Result<T, CodecError> {
        if self.max_length != 0 && value.len() > self.max_length {
            return Err(CodecError::ValueTooLong {
                len: value.len(),
                max: self.max_length,
            });
        }

        let raw = URL_SAFE.decode(value)?;

        // The MAC is raw bytes and may itself contain `|`, so split at
        // most twice and leave the tail intact.
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(payload), Some(mac)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::Malformed);
        };

        self.verify(name, timestamp, payload, mac)?;

        let signed_at = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or(CodecError::InvalidTimestamp)?;

        if self.min_age != 0 && signed_at > now - self.min_age {
            return Err(CodecError::TimestampTooNew);
        }
        if self.max_age != 0 && signed_at < now - self.max_age {
            return Err(CodecError::TimestampExpired);
        }

        let payload = match &self.block_key {
            Some(key) => {
                let ciphertext =
                    std::str::from_utf8(payload).map_err(|_| CodecError::Decrypt)?;
                decrypt(key, name, ciphertext)?
            }
            None => String::from_utf8(payload.to_vec()).map_err(|_| CodecError::Malformed)?,
        };
        let payload = URL_SAFE.decode(payload)?;
        self.serializer.deserialize(&payload)
    }

    fn mac(
        &self,
        name: &str,
        timestamp: &[u8],
        payload: &[u8],
    ) -> Result<HmacSha256, CodecError> {
        let mut mac = HmacSha256::new_from_slice(&self.hash_key)
            .map_err(|_| CodecError::HashKeyNotSet)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp);
        mac.update(b"|");
        mac.update(payload);
        Ok(mac)
    }

    fn sign(
        &self,
        name: &str,
        timestamp: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        Ok(self
            .mac(name, timestamp, payload)?
            .finalize()
            .into_bytes()
            .to_vec())
    }

    /// Constant-time MAC comparison.
    fn verify(
        &self,
        name: &str,
        timestamp: &[u8],
        payload: &[u8],
        expected: &[u8],
    ) -> Result<(), CodecError> {
        self.mac(name, timestamp, payload)?
            .verify_slice(expected)
            .map_err(|_| CodecError::HashMismatch)
    }
}

/// Keys never show up in logs.
impl<S> fmt::Debug for SecureCookie<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCookie")
            .field("hash_key", &"<redacted>")
            .field("encrypted", &self.block_key.is_some())
            .field("max_age", &self.max_age)
            .field("min_age", &self.min_age)
            .field("max_length", &self.max_length)
            .finish()
    }
}

/// Runs `plaintext` through a private jar, which seals it with
/// AES-256-GCM and returns base64 (standard alphabet, never `|`).
fn encrypt(key: &Key, name: &str, plaintext: String) -> Result<String, CodecError> {
    let mut jar = CookieJar::new();
    jar.private_mut(key)
        .add(Cookie::new(name.to_owned(), plaintext));
    jar.get(name)
        .map(|sealed| sealed.value().to_owned())
        .ok_or(CodecError::Encrypt)
}

fn decrypt(key: &Key, name: &str, ciphertext: &str) -> Result<String, CodecError> {
    CookieJar::new()
        .private(key)
        .decrypt(Cookie::new(name.to_owned(), ciphertext.to_owned()))
        .map(|opened| opened.value().to_owned())
        .ok_or(CodecError::Decrypt)
}

// ---------------------------------------------------------------------------
// Multiple codecs (key rotation)
// ---------------------------------------------------------------------------

/// A hash key plus an optional block key: one codec's worth of secrets.
///
/// `KeyPair::signing` only signs; `KeyPair::encrypting` signs and
/// encrypts.
#[derive(Clone)]
pub struct KeyPair {
    pub hash: Vec<u8>,
    pub block: Option<Vec<u8>>,
}

impl KeyPair {
    pub fn signing(hash: impl Into<Vec<u8>>) -> Self {
        Self {
            hash: hash.into(),
            block: None,
        }
    }

    pub fn encrypting(hash: impl Into<Vec<u8>>, block: impl Into<Vec<u8>>) -> Self {
        Self {
            hash: hash.into(),
            block: Some(block.into()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash", &"<redacted>")
            .field("block", &self.block.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Builds one JSON codec per key pair, in order.
///
/// Same rotation rules as [`codecs_from_keys`]: the first pair encodes,
/// every pair decodes.
///
/// # Errors
/// [`CodecError::HashKeyNotSet`] for an empty hash key,
/// [`CodecError::InvalidBlockKey`] for a short block key.
pub fn codecs_from_pairs(pairs: &[KeyPair]) -> Result<Vec<SecureCookie>, CodecError> {
    pairs
        .iter()
        .map(|pair| {
            let codec = SecureCookie::new(pair.hash.clone())?;
            match &pair.block {
                Some(block) => codec.with_block_key(block),
                None => Ok(codec),
            }
        })
        .collect()
}

/// Builds one signing-only JSON codec per hash key.
///
/// Every key is a hash key. To encrypt as well, use
/// [`codecs_from_pairs`].
///
/// Pass the current key first and retired keys after it: new values are
/// signed with the first key, while values signed with an older key keep
/// decoding until they age out.
///
/// # Errors
/// Returns [`CodecError::HashKeyNotSet`] if any key is empty.
pub fn codecs_from_keys<K: AsRef<[u8]>>(
    keys: &[K],
) -> Result<Vec<SecureCookie>, CodecError> {
    keys.iter()
        .map(|key| SecureCookie::new(key.as_ref().to_vec()))
        .collect()
}

/// Encodes with the first codec that succeeds.
///
/// # Errors
/// - [`CodecError::NoCodecs`]: `codecs` is empty
/// - the codec's own error when there is exactly one codec
/// - [`CodecError::Multi`] when several codecs all failed
pub fn encode_multi<S: Serializer, T: Serialize + ?Sized>(
    name: &str,
    value: &T,
    codecs: &[SecureCookie<S>],
) -> Result<String, CodecError> {
    first_success(codecs, |codec| codec.encode(name, value))
}

/// Decodes with the first codec that succeeds.
///
/// # Errors
/// Same rules as [`encode_multi`].
pub fn decode_multi<S: Serializer, T: DeserializeOwned>(
    name: &str,
    value: &str,
    codecs: &[SecureCookie<S>],
) -> Result<T, CodecError> {
    first_success(codecs, |codec| codec.decode(name, value))
}

fn first_success<S, R>(
    codecs: &[SecureCookie<S>],
    mut op: impl FnMut(&SecureCookie<S>) -> Result<R, CodecError>,
) -> Result<R, CodecError> {
    if codecs.is_empty() {
        return Err(CodecError::NoCodecs);
    }

    let mut errors = Vec::new();
    for codec in codecs {
        match op(codec) {
            Ok(value) => return Ok(value),
            Err(e) => errors.push(e),
        }
    }

    if errors.len() == 1 {
        // Length checked above; `pop` can't miss.
        if let Some(only) = errors.pop() {
            return Err(only);
        }
    }
    Err(CodecError::Multi(errors))
}

/// Generates a random key of `len` bytes, suitable as a hash key.
///
/// 32 or 64 bytes are good choices for HMAC-SHA256. Keys must be stored
/// somewhere stable: regenerating them on every start logs everybody out.
pub fn generate_random_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::rng().fill(&mut key[..]);
    key
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================
