//! Session types: the data a store loads and saves for one cookie name.
//!
//! A "session" is the server's view of one named bag of per-user state.
//! It tracks:
//! - WHICH cookie it belongs to (`name`)
//! - WHERE the server-side copy lives, if any (`id`)
//! - WHAT the handler stored (`values`)
//! - HOW the cookie is emitted (`options`)
//! - WHETHER it came from the request or was just created (`is_new`)

use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::StoreError;

/// Key under which [`Session::add_flash`] stores flash messages.
pub const FLASHES_KEY: &str = "_flash";

// ---------------------------------------------------------------------------
// CookieOptions
// ---------------------------------------------------------------------------

/// Attributes of the session cookie, plus the session lifetime.
///
/// `max_age` doubles as the session lifetime: it becomes the cookie's
/// `Max-Age`, the codec's signature max age, and the Redis TTL.
///
/// | `max_age` | cookie                         | on save          |
/// |-----------|--------------------------------|------------------|
/// | `> 0`     | `Max-Age=n`, `Expires=now+n`   | persist          |
/// | `0`       | browser-session cookie         | delete           |
/// | `< 0`     | `Max-Age=0`, `Expires` in 1970 | delete           |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    /// Cookie `Path`. Default: `/`.
    pub path: String,

    /// Cookie `Domain`. Default: none (host-only cookie).
    pub domain: Option<String>,

    /// Lifetime in seconds. Default: 30 days.
    pub max_age: i64,

    /// Send the cookie over HTTPS only.
    pub secure: bool,

    /// Hide the cookie from JavaScript.
    pub http_only: bool,

    /// Cookie `SameSite` attribute. Default: not set.
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: satchel_codec::DEFAULT_MAX_AGE,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

/// The cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Builds a `Set-Cookie` cookie from a name, value and options.
pub fn new_cookie(
    name: &str,
    value: &str,
    options: &CookieOptions,
) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_owned(), value.to_owned()))
        .path(options.path.clone());

    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if options.secure {
        builder = builder.secure(true);
    }
    if options.http_only {
        builder = builder.http_only(true);
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site.into());
    }

    if options.max_age > 0 {
        let lifetime = Duration::seconds(options.max_age);
        builder = builder
            .max_age(lifetime)
            .expires(OffsetDateTime::now_utc() + lifetime);
    } else if options.max_age < 0 {
        builder = builder
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
    }

    builder.build()
}

/// Builds an empty cookie that makes the browser drop `name` right away.
pub fn expired_cookie(name: &str, options: &CookieOptions) -> Cookie<'static> {
    let options = CookieOptions {
        max_age: -1,
        ..options.clone()
    };
    new_cookie(name, "", &options)
}

// ---------------------------------------------------------------------------
// ResponseCookies
// ---------------------------------------------------------------------------

/// Cookies a store wants set on the response, in the order they were
/// added. The middleware turns each one into a `Set-Cookie` header.
#[derive(Debug, Clone, Default)]
pub struct ResponseCookies {
    cookies: Vec<Cookie<'static>>,
}

impl ResponseCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cookie: Cookie<'static>) {
        self.cookies.push(cookie);
    }

    /// The most recently added cookie called `name`.
    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().rev().find(|c| c.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.iter()
    }

    /// Removes and returns every pending cookie.
    pub fn drain(&mut self) -> Vec<Cookie<'static>> {
        std::mem::take(&mut self.cookies)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One named session for the current request.
///
/// Values are stored as JSON values so a session can hold anything serde
/// can represent. Use the typed [`get`](Self::get) /
/// [`insert`](Self::insert) helpers, or reach into `values` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    name: String,

    /// Server-side identifier. Empty for cookie-only sessions and for
    /// remote sessions that were never saved.
    pub id: String,

    /// The session data.
    pub values: Map<String, Value>,

    /// Cookie attributes and lifetime used when this session is saved.
    /// Set `options.max_age` to `0` or less to delete the session.
    pub options: CookieOptions,

    /// `true` until the session has been successfully loaded from the
    /// request.
    pub is_new: bool,
}

impl Session {
    /// Creates an empty, new session.
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            values: Map::new(),
            options,
            is_new: true,
        }
    }

    /// The cookie name this session is stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads `key` as a `T`. Returns `Ok(None)` if the key is absent.
    ///
    /// # Errors
    /// [`StoreError::Value`] if the stored value isn't a valid `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.values
            .get(key)
            .map(|value| {
                T::deserialize(value).map_err(|source| StoreError::Value {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Stores `value` under `key`, returning the previous raw value.
    ///
    /// # Errors
    /// [`StoreError::Value`] if `value` can't be represented as JSON.
    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, StoreError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| {
            StoreError::Value {
                key: key.clone(),
                source,
            }
        })?;
        Ok(self.values.insert(key, value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Queues a flash message under [`FLASHES_KEY`].
    ///
    /// Flash messages live until they are read with
    /// [`flashes`](Self::flashes); remember to save the session after
    /// adding or reading them.
    pub fn add_flash<T: Serialize>(&mut self, value: T) -> Result<(), StoreError> {
        self.add_flash_to(FLASHES_KEY, value)
    }

    /// Queues a flash message under a custom key.
    pub fn add_flash_to<T: Serialize>(
        &mut self,
        key: &str,
        value: T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| {
            StoreError::Value {
                key: key.to_string(),
                source,
            }
        })?;
        match self.values.get_mut(key) {
            Some(Value::Array(queue)) => queue.push(value),
            _ => {
                self.values.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
        Ok(())
    }

    /// Takes every flash message stored under [`FLASHES_KEY`].
    pub fn flashes(&mut self) -> Vec<Value> {
        self.flashes_from(FLASHES_KEY)
    }

    /// Takes every flash message stored under `key`.
    pub fn flashes_from(&mut self, key: &str) -> Vec<Value> {
        match self.values.remove(key) {
            Some(Value::Array(queue)) => queue,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
