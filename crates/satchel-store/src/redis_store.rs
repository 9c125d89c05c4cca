//! Server-side sessions: data in Redis, signed id in the cookie.
//!
//! ```text
//! cookie:  name = sign(name, session.id)
//! redis:   "{prefix}:{session.id}" = sign(name, session.values)   EX max_age
//! ```
//!
//! The stored payload is signed with the same codecs as the cookie, so a
//! record copied between keys, or between session names, won't verify.
//! Expiry is left to Redis: the record TTL is the session `max_age`.

use std::future::Future;

use satchel_codec::{
    KeyPair, SecureCookie, codecs_from_keys, codecs_from_pairs, decode_multi,
    encode_multi,
};
use uuid::Uuid;

use crate::{
    ConfigStore, CookieOptions, RequestContext, ResponseCookies, Session,
    Store, StoreError, expired_cookie, new_cookie,
};

/// Key prefix used when none (or an empty one) is configured.
pub const DEFAULT_KEY_PREFIX: &str = "_session";

// ---------------------------------------------------------------------------
// RemoteClient
// ---------------------------------------------------------------------------

/// The three key/value commands [`RedisStore`] needs.
///
/// Implemented for `redis::aio::ConnectionManager` and
/// `redis::aio::MultiplexedConnection` (feature `redis`). Implement it
/// yourself to put sessions in another key/value service, or to test
/// against an in-memory map.
pub trait RemoteClient: Send + Sync + 'static {
    /// Reads `key`. A missing key is `Ok(None)`, not an error.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Writes `key` with a time-to-live in seconds.
    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn del(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(feature = "redis")]
mod redis_client {
    use redis::AsyncCommands;

    use super::RemoteClient;
    use crate::StoreError;

    // Both connection types are cheap multiplexed handles: clone one per
    // command instead of locking a shared `&mut`. Calls are spelled out
    // because `RemoteClient` and `AsyncCommands` share method names.
    macro_rules! impl_remote_client {
        ($conn:ty) => {
            impl RemoteClient for $conn {
                async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
                    let mut conn = self.clone();
                    Ok(AsyncCommands::get::<_, Option<String>>(&mut conn, key).await?)
                }

                async fn set_ex(
                    &self,
                    key: &str,
                    value: &str,
                    ttl_secs: u64,
                ) -> Result<(), StoreError> {
                    let mut conn = self.clone();
                    AsyncCommands::set_ex::<_, _, ()>(&mut conn, key, value, ttl_secs)
                        .await?;
                    Ok(())
                }

                async fn del(&self, key: &str) -> Result<(), StoreError> {
                    let mut conn = self.clone();
                    AsyncCommands::del::<_, ()>(&mut conn, key).await?;
                    Ok(())
                }
            }
        };
    }

    impl_remote_client!(redis::aio::ConnectionManager);
    impl_remote_client!(redis::aio::MultiplexedConnection);
}

// ---------------------------------------------------------------------------
// RedisStore
// ---------------------------------------------------------------------------

/// A [`Store`] that keeps session data in Redis (or any [`RemoteClient`]).
///
/// ## Example
///
/// ```rust,no_run
/// # #[cfg(feature = "redis")]
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use satchel_store::RedisStore;
///
/// let client = redis::Client::open("redis://127.0.0.1/")?;
/// let conn = redis::aio::ConnectionManager::new(client).await?;
/// let store = RedisStore::new(conn, &[b"signing-key"])?.with_prefix("myapp");
/// assert_eq!(store.session_key("abc"), "myapp:abc");
/// # Ok(())
/// # }
/// ```
pub struct RedisStore<C> {
    client: C,
    codecs: Vec<SecureCookie>,
    options: CookieOptions,
    prefix: String,
}

impl<C: RemoteClient> RedisStore<C> {
    /// Creates a store on top of `client`, signing with `keys[0]` and
    /// accepting all of them.
    ///
    /// # Errors
    /// [`StoreError::Codec`] if any key is empty.
    pub fn new<K: AsRef<[u8]>>(client: C, keys: &[K]) -> Result<Self, StoreError> {
        Ok(Self::with_codecs(client, codecs_from_keys(keys)?))
    }

    /// Creates a store from hash/block key pairs. Pairs with a block key
    /// encrypt both the stored record and the id cookie.
    ///
    /// # Errors
    /// [`StoreError::Codec`] if a hash key is empty or a block key is
    /// shorter than 32 bytes.
    pub fn from_pairs(client: C, pairs: &[KeyPair]) -> Result<Self, StoreError> {
        Ok(Self::with_codecs(client, codecs_from_pairs(pairs)?))
    }

    fn with_codecs(client: C, codecs: Vec<SecureCookie>) -> Self {
        let mut store = Self {
            client,
            codecs,
            options: CookieOptions::default(),
            prefix: String::new(),
        };
        store.set_max_age(store.options.max_age);
        store
    }

    /// Sets the key prefix. An empty prefix means [`DEFAULT_KEY_PREFIX`].
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.set_prefix(prefix);
        self
    }

    /// The key prefix in effect.
    pub fn prefix(&self) -> &str {
        if self.prefix.is_empty() {
            DEFAULT_KEY_PREFIX
        } else {
            &self.prefix
        }
    }

    /// The Redis key for a session id: `{prefix}:{id}`.
    pub fn session_key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix(), id)
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Default options for sessions created by this store.
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Replaces the default options; the codecs follow `max_age`.
    pub fn set_options(&mut self, options: CookieOptions) {
        let max_age = options.max_age;
        self.options = options;
        self.set_max_age(max_age);
    }

    pub fn codecs(&self) -> &[SecureCookie] {
        &self.codecs
    }

    async fn load_values(&self, session: &mut Session) -> Result<bool, StoreError> {
        let key = self.session_key(&session.id);
        let Some(payload) = self.client.get(&key).await? else {
            return Ok(false);
        };
        session.values = decode_multi(session.name(), &payload, &self.codecs)?;
        Ok(true)
    }
}

impl<C: RemoteClient> Store for RedisStore<C> {
    fn new_session(&self, name: &str) -> Session {
        Session::new(name, self.options.clone())
    }

    async fn load(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Session, StoreError> {
        let mut session = self.new_session(name);

        let Some(content) = ctx.session_value(name)? else {
            tracing::debug!(session = %name, "no session id, starting new session");
            return Ok(session);
        };

        session.id = decode_multi(name, &content, &self.codecs)?;

        // A vanished record (TTL ran out, or deleted elsewhere) is not an
        // error: the session starts over, keeping its id.
        if self.load_values(&mut session).await? {
            session.is_new = false;
            tracing::debug!(session = %name, id = %session.id, "session loaded");
        } else {
            tracing::debug!(
                session = %name,
                id = %session.id,
                "session record not found, starting new session"
            );
        }

        Ok(session)
    }

    async fn save(
        &self,
        session: &mut Session,
        cookies: &mut ResponseCookies,
    ) -> Result<(), StoreError> {
        if session.options.max_age <= 0 {
            if !session.id.is_empty() {
                self.client.del(&self.session_key(&session.id)).await?;
            }
            cookies.add(expired_cookie(session.name(), &session.options));
            tracing::debug!(session = %session.name(), id = %session.id, "session deleted");
            return Ok(());
        }

        if session.id.is_empty() {
            session.id = Uuid::new_v4().to_string();
        }

        let payload = encode_multi(session.name(), &session.values, &self.codecs)?;
        let key = self.session_key(&session.id);
        // `max_age > 0` was checked above.
        let ttl = session.options.max_age as u64;
        self.client.set_ex(&key, &payload, ttl).await?;

        let encoded_id = encode_multi(session.name(), &session.id, &self.codecs)?;
        cookies.add(new_cookie(session.name(), &encoded_id, &session.options));

        tracing::debug!(session = %session.name(), %key, ttl, "session saved");
        Ok(())
    }

    fn config_mut(&mut self) -> Option<&mut dyn ConfigStore> {
        Some(self)
    }
}

impl<C: RemoteClient> ConfigStore for RedisStore<C> {
    fn set_max_age(&mut self, secs: i64) {
        self.options.max_age = secs;
        for codec in &mut self.codecs {
            codec.set_max_age(secs);
        }
    }

    fn set_max_length(&mut self, len: usize) {
        for codec in &mut self.codecs {
            codec.set_max_length(len);
        }
    }

    fn set_min_age(&mut self, secs: i64) {
        for codec in &mut self.codecs {
            codec.set_min_age(secs);
        }
    }
}

impl<C> std::fmt::Debug for RedisStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .field("options", &self.options)
            .field("codecs", &self.codecs.len())
            .finish_non_exhaustive()
    }
}
