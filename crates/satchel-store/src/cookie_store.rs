//! Client-side sessions: the signed session data is the cookie.
//!
//! Nothing is kept on the server, so there is nothing to clean up and
//! nothing to share between instances. The price is size: the encoded
//! session must fit in `max_length` (4096 bytes by default).

use satchel_codec::{
    KeyPair, SecureCookie, codecs_from_keys, codecs_from_pairs, decode_multi,
    encode_multi,
};

use crate::{
    ConfigStore, CookieOptions, RequestContext, ResponseCookies, Session,
    Store, StoreError, expired_cookie, new_cookie,
};

/// A [`Store`] that keeps the whole session in a signed cookie.
///
/// ## Example
///
/// ```rust
/// use satchel_store::CookieStore;
///
/// // Current key first, retired keys after it.
/// let keys: [&[u8]; 2] = [b"current-signing-key", b"retired-key"];
/// let store = CookieStore::new(&keys).unwrap();
/// assert_eq!(store.options().path, "/");
/// ```
#[derive(Debug, Clone)]
pub struct CookieStore {
    codecs: Vec<SecureCookie>,
    options: CookieOptions,
}

impl CookieStore {
    /// Creates a store signing with `keys[0]` and accepting all of them.
    ///
    /// # Errors
    /// [`StoreError::Codec`] if any key is empty.
    pub fn new<K: AsRef<[u8]>>(keys: &[K]) -> Result<Self, StoreError> {
        Ok(Self::with_codecs(codecs_from_keys(keys)?))
    }

    /// Creates a store from hash/block key pairs. Pairs with a block key
    /// encrypt the cookie as well as signing it.
    ///
    /// # Errors
    /// [`StoreError::Codec`] if a hash key is empty or a block key is
    /// shorter than 32 bytes.
    pub fn from_pairs(pairs: &[KeyPair]) -> Result<Self, StoreError> {
        Ok(Self::with_codecs(codecs_from_pairs(pairs)?))
    }

    fn with_codecs(codecs: Vec<SecureCookie>) -> Self {
        let mut store = Self {
            codecs,
            options: CookieOptions::default(),
        };
        store.set_max_age(store.options.max_age);
        store
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
}

impl Store for CookieStore {
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
            tracing::debug!(session = %name, "no session value, starting new session");
            return Ok(session);
        };

        session.values = decode_multi(name, &content, &self.codecs)?;
        session.is_new = false;

        tracing::debug!(
            session = %name,
            keys = session.values.len(),
            "session loaded from cookie"
        );
        Ok(session)
    }

    async fn save(
        &self,
        session: &mut Session,
        cookies: &mut ResponseCookies,
    ) -> Result<(), StoreError> {
        if session.options.max_age <= 0 {
            cookies.add(expired_cookie(session.name(), &session.options));
            tracing::debug!(session = %session.name(), "session cookie expired");
            return Ok(());
        }

        let encoded = encode_multi(session.name(), &session.values, &self.codecs)?;
        cookies.add(new_cookie(session.name(), &encoded, &session.options));

        tracing::debug!(
            session = %session.name(),
            bytes = encoded.len(),
            "session saved to cookie"
        );
        Ok(())
    }

    fn config_mut(&mut self) -> Option<&mut dyn ConfigStore> {
        Some(self)
    }
}

impl ConfigStore for CookieStore {
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

// =========================================================================
// Tests
// =========================================================================
