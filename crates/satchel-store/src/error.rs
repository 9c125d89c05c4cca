//! Error types for the store layer.

use satchel_codec::CodecError;

/// Errors that can occur while loading or saving a session.
///
/// Codec and backend errors are wrapped, not rewritten: the caller sees
/// exactly what the signer or Redis reported.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Signing, verifying, or (de)serializing a cookie value failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The request body could not be buffered by the middleware. Only
    /// reported when the lookup actually reaches the body.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The request declared `application/json` but the body is not a
    /// JSON object.
    #[error("invalid JSON request body: {0}")]
    JsonBody(#[source] serde_json::Error),

    /// The JSON body has a field named like the session, but it isn't a
    /// string.
    #[error("field `{0}` in the JSON request body is not a string")]
    NotAString(String),

    /// A session value could not be converted to or from the requested
    /// type.
    #[error("invalid session value for `{key}`: {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The Redis client reported an error.
    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// A custom [`RemoteClient`](crate::RemoteClient) reported an error.
    #[error("remote store error: {0}")]
    Backend(String),
}
