//! Serializer trait and implementations for turning values into bytes.
//!
//! A [`SecureCookie`](crate::SecureCookie) doesn't care HOW a value is
//! turned into bytes before it gets signed. It just needs something that
//! implements [`Serializer`]. This is the "strategy pattern": we define an
//! interface, and swap implementations.
//!
//! Currently we provide [`JsonSerializer`], which is readable once the
//! base64 framing is peeled off and works with any serde type.

use serde::{Serialize, de::DeserializeOwned};

use crate::CodecError;

/// Converts values to bytes and back, before signing / after verifying.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → a codec is shared by every request a store serves,
///   possibly on different Tokio worker threads.
/// - `'static` → it owns everything it needs; stores live as long as the
///   server does.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the result doesn't
/// borrow from the input bytes, so the decoded cookie buffer can be
/// dropped right after decoding.
pub trait Serializer: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`CodecError::Encode`] if the value can't be represented.
    fn serialize<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`CodecError::Decode`] if the bytes don't match `T`.
    fn deserialize<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, CodecError>;
}

// ---------------------------------------------------------------------------
// JsonSerializer
// ---------------------------------------------------------------------------

/// A [`Serializer`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use satchel_codec::{JsonSerializer, Serializer};
///
/// let bytes = JsonSerializer.serialize(&vec![1, 2, 3]).unwrap();
/// assert_eq!(bytes, b"[1,2,3]");
///
/// let back: Vec<u8> = JsonSerializer.deserialize(&bytes).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    fn deserialize<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::Decode)
    }
}
