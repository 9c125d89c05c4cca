//! Session model and storage backends for Satchel.
//!
//! This crate handles everything between "the handler wants its session"
//! and "the bytes are in a cookie or in Redis":
//!
//! 1. **Lookup**: finding the session value in the request
//!    ([`RequestContext`]: cookie, then query, then JSON body)
//! 2. **Model**: the [`Session`] itself and its [`CookieOptions`]
//! 3. **Storage**: the [`Store`] trait, with [`CookieStore`] and
//!    [`RedisStore`] implementations
//!
//! # How it fits in the stack
//!
//! ```text
//! Middleware (above)  ← hands each request a handle bound to a store
//!     ↕
//! Store layer (this crate)  ← loads and persists sessions
//!     ↕
//! Codec layer (below)  ← signs and verifies the stored strings
//! ```

mod cookie_store;
mod error;
mod extract;
mod redis_store;
mod session;
mod store;

pub use cookie_store::CookieStore;
pub use error::StoreError;
pub use extract::{RequestContext, is_json_content_type};
pub use redis_store::{DEFAULT_KEY_PREFIX, RedisStore, RemoteClient};
pub use session::{
    CookieOptions, FLASHES_KEY, ResponseCookies, SameSite, Session,
    expired_cookie, new_cookie,
};
pub use store::{ConfigStore, Store};

/// Re-exported so callers can name cookie types without a direct
/// dependency.
pub use cookie::Cookie;
pub use satchel_codec::KeyPair;
