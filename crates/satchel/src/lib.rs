//! # Satchel
//!
//! Session middleware for axum, with a signed-cookie store and a Redis
//! store.
//!
//! Satchel attaches a [`RequestSession`] to every request. Handlers load
//! sessions by name, change them, and save them; the middleware writes the
//! resulting cookies onto the response.
//!
//! The session value is looked up in this order:
//! 1. a cookie named after the session
//! 2. a query parameter of the same name
//! 3. a top-level string field of a JSON request body
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use satchel::prelude::*;
//! use axum::{Router, routing::get};
//!
//! async fn visit(sessions: Sessions) -> Result<String, SatchelError> {
//!     let handle = sessions.get("session")?;
//!     let mut session = handle.get("sid").await?;
//!     let visits = session.get::<u64>("visits")?.unwrap_or(0) + 1;
//!     session.insert("visits", visits)?;
//!     handle.save(&mut session).await?;
//!     Ok(visits.to_string())
//! }
//!
//! # fn main() -> Result<(), SatchelError> {
//! let store = CookieStore::new(&[b"a-very-secret-signing-key"])?;
//! let app: Router = Router::new()
//!     .route("/", get(visit))
//!     .layer(SessionLayer::builder(store).option(SessionOption::MaxAge(3600)).build());
//! # Ok(())
//! # }
//! ```

mod error;
mod handle;
mod layer;
mod option;

pub use error::SatchelError;
pub use handle::{RequestSession, Sessions, get_request_session};
pub use layer::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_SESSION_KEY, SessionLayer,
    SessionLayerBuilder, SessionLayerConfig, SessionService,
};
pub use option::SessionOption;

/// Re-export the sub-crates for direct access when needed.
pub use satchel_codec;
pub use satchel_store;

/// Common imports for applications.
///
/// ```rust
/// use satchel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        RequestSession, SatchelError, SessionLayer, SessionLayerConfig,
        SessionOption, Sessions, get_request_session,
    };
    pub use satchel_codec::{KeyPair, SecureCookie, generate_random_key};
    pub use satchel_store::{
        CookieOptions, CookieStore, RedisStore, RemoteClient, SameSite, Session,
        Store,
    };
}
