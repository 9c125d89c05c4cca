//! Unified error type for Satchel.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use satchel_codec::CodecError;
use satchel_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// Handlers deal with this single type instead of importing errors from
/// each sub-crate. The `#[from]` attributes let `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SatchelError {
    /// A store-level error (request lookup, backend, codec inside a store).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A codec-level error raised outside a store.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No [`SessionLayer`](crate::SessionLayer) wraps this route.
    #[error("session middleware is not installed")]
    MissingLayer,

    /// A session layer is installed, but none under this key.
    #[error("no session middleware registered under key `{0}`")]
    MissingSession(String),
}

/// Lets handlers return `Result<_, SatchelError>` and lets [`Sessions`]
/// reject requests. Every variant is a server-side problem, so the
/// client gets a 500 and the details go to the log.
///
/// [`Sessions`]: crate::Sessions
impl IntoResponse for SatchelError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "session error");
        (StatusCode::INTERNAL_SERVER_ERROR, "session error").into_response()
    }
}
