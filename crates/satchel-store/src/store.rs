//! The storage seam: where session data lives between requests.
//!
//! Satchel doesn't decide where your sessions live. It defines the
//! [`Store`] trait and ships two implementations:
//! - [`CookieStore`](crate::CookieStore): everything in the cookie
//! - [`RedisStore`](crate::RedisStore): data in Redis, id in the cookie
//!
//! Handlers and middleware only ever talk to the trait, so switching
//! backends is a one-line change where the layer is built.

use std::future::Future;

use crate::{RequestContext, ResponseCookies, Session, StoreError};

/// Loads sessions from requests and persists them into responses.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one store is shared by every request the
///   server handles, across Tokio worker threads, for the server's whole
///   lifetime.
pub trait Store: Send + Sync + 'static {
    /// A fresh, empty session called `name` with the store's default
    /// options.
    fn new_session(&self, name: &str) -> Session;

    /// Loads the session called `name` for this request.
    ///
    /// Returns a new session (`is_new == true`) when the request carries
    /// no session value, or when the remote record is gone.
    ///
    /// # Errors
    /// Codec and backend errors are returned unchanged.
    fn load(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Persists `session` and queues the cookie the client needs.
    ///
    /// A session whose `options.max_age` is `0` or less is deleted
    /// instead, and an expired cookie is queued.
    ///
    /// # Errors
    /// Codec and backend errors are returned unchanged.
    fn save(
        &self,
        session: &mut Session,
        cookies: &mut ResponseCookies,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The store's configuration capability, if it has one.
    ///
    /// Options applied to a store that returns `None` are ignored.
    fn config_mut(&mut self) -> Option<&mut dyn ConfigStore> {
        None
    }
}

/// Stores whose codec limits can be tuned after construction.
pub trait ConfigStore {
    /// Session lifetime in seconds: cookie `Max-Age`, codec max age and
    /// (for remote stores) record TTL.
    fn set_max_age(&mut self, secs: i64);

    /// Longest encoded value the codecs produce or accept. `0` disables.
    fn set_max_length(&mut self, len: usize);

    /// Youngest signature the codecs accept, in seconds. `0` disables.
    fn set_min_age(&mut self, secs: i64);
}
