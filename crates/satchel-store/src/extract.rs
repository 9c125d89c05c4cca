//! Finding the session value a client sent with its request.
//!
//! Browsers send the session cookie, but API clients and redirects
//! sometimes can't. So a session value is looked up in three places, in
//! this order, and the first hit wins:
//!
//! 1. the cookie named like the session,
//! 2. a URL query parameter named like the session,
//! 3. a string field named like the session in an `application/json`
//!    request body.
//!
//! Later sources are only consulted when earlier ones are absent. In
//! particular, a broken JSON body never matters if the cookie is there.

use bytes::Bytes;
use cookie::Cookie;
use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Uri};
use serde_json::{Map, Value};

use crate::StoreError;

/// What the middleware captured from the request body.
#[derive(Debug, Clone, Default)]
enum BodyState {
    /// No JSON body (wrong content type, or never captured).
    #[default]
    Absent,
    /// The buffered JSON body. The request still carries its own copy.
    Json(Bytes),
    /// Buffering failed; reported only if the lookup gets this far.
    Failed(String),
}

/// The parts of a request that session lookup needs.
///
/// Handlers run after the body has been handed to them, so the
/// middleware snapshots headers, query string and (for JSON requests)
/// the body up front.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    query: Option<String>,
    body: BodyState,
}

impl RequestContext {
    /// Captures headers and query string. Attach a body with
    /// [`with_json_body`](Self::with_json_body).
    pub fn new(headers: HeaderMap, uri: &Uri) -> Self {
        Self {
            headers,
            query: uri.query().map(str::to_owned),
            body: BodyState::Absent,
        }
    }

    /// Captures headers and query string from request parts.
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::new(parts.headers.clone(), &parts.uri)
    }

    /// Attaches the buffered request body.
    pub fn with_json_body(mut self, body: Bytes) -> Self {
        self.body = BodyState::Json(body);
        self
    }

    /// Records that the request body couldn't be buffered.
    pub fn with_body_error(mut self, error: impl ToString) -> Self {
        self.body = BodyState::Failed(error.to_string());
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns `true` when the request declares a JSON body. Media type
    /// parameters such as `; charset=utf-8` are ignored.
    pub fn is_json(&self) -> bool {
        is_json_content_type(&self.headers)
    }

    /// Looks up the session value for `name`: cookie, then query, then
    /// JSON body.
    ///
    /// # Errors
    /// Only the body stage can fail:
    /// - [`StoreError::Body`]: the middleware couldn't buffer the body
    /// - [`StoreError::JsonBody`]: the body isn't a JSON object
    /// - [`StoreError::NotAString`]: the field exists but isn't a string
    pub fn session_value(&self, name: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.cookie(name) {
            return Ok(Some(value));
        }
        if let Some(value) = self.query_param(name) {
            return Ok(Some(value));
        }
        self.json_field(name)
    }

    /// The first cookie called `name`, across every `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_owned())
    }

    /// The first query parameter called `name`. An empty value still
    /// counts as present.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// The string field called `name` in the JSON body.
    ///
    /// # Errors
    /// See [`session_value`](Self::session_value).
    pub fn json_field(&self, name: &str) -> Result<Option<String>, StoreError> {
        if !self.is_json() {
            return Ok(None);
        }

        let body = match &self.body {
            BodyState::Absent => return Ok(None),
            BodyState::Failed(error) => return Err(StoreError::Body(error.clone())),
            BodyState::Json(body) => body,
        };

        let fields: Map<String, Value> =
            serde_json::from_slice(body).map_err(StoreError::JsonBody)?;

        match fields.get(name) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::NotAString(name.to_string())),
        }
    }
}

/// Returns `true` when `Content-Type` is `application/json`.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| {
            essence.trim().eq_ignore_ascii_case("application/json")
        })
}

// =========================================================================
// Tests
// =========================================================================
