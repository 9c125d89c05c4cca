//! The per-request session handle and how handlers reach it.
//!
//! Every request that passes through a [`SessionLayer`] gets a
//! [`RequestSession`]: a cheap, cloneable handle bound to that layer's
//! store and to this request. Handlers find it through the [`Sessions`]
//! extractor (or [`get_request_session`]) under the layer's key.
//!
//! [`SessionLayer`]: crate::SessionLayer

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use futures_util::future::BoxFuture;
use http::header::SET_COOKIE;
use http::request::Parts;
use http::{Extensions, HeaderMap, HeaderValue};
use satchel_store::{
    RequestContext, ResponseCookies, Session, Store, StoreError,
};
use tokio::sync::Mutex;

use crate::SatchelError;

// ---------------------------------------------------------------------------
// Type-erased store
// ---------------------------------------------------------------------------

/// Object-safe view of a [`Store`], so handles and layers don't carry the
/// store type around. Every `Store` gets it for free.
pub(crate) trait ErasedStore: Send + Sync + 'static {
    fn new_session(&self, name: &str) -> Session;

    fn load<'a>(
        &'a self,
        ctx: &'a RequestContext,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Session, StoreError>>;

    fn save<'a>(
        &'a self,
        session: &'a mut Session,
        cookies: &'a mut ResponseCookies,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

impl<S: Store> ErasedStore for S {
    fn new_session(&self, name: &str) -> Session {
        Store::new_session(self, name)
    }

    fn load<'a>(
        &'a self,
        ctx: &'a RequestContext,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Session, StoreError>> {
        Box::pin(Store::load(self, ctx, name))
    }

    fn save<'a>(
        &'a self,
        session: &'a mut Session,
        cookies: &'a mut ResponseCookies,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(Store::save(self, session, cookies))
    }
}

// ---------------------------------------------------------------------------
// RequestSession
// ---------------------------------------------------------------------------

/// Session access for one request, bound to one store.
///
/// Sessions are cached by name for the rest of the request: the second
/// `get("cart")` returns what the first one loaded (or what was saved
/// since) without asking the store again.
///
/// Cookies produced by [`save`](Self::save) are written to the response
/// by the middleware once the handler returns.
#[derive(Clone)]
pub struct RequestSession {
    ctx: Arc<RequestContext>,
    store: Arc<dyn ErasedStore>,
    registry: Arc<Mutex<HashMap<String, Session>>>,
    cookies: Arc<Mutex<ResponseCookies>>,
}

impl RequestSession {
    pub(crate) fn new(ctx: RequestContext, store: Arc<dyn ErasedStore>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            store,
            registry: Arc::new(Mutex::new(HashMap::new())),
            cookies: Arc::new(Mutex::new(ResponseCookies::new())),
        }
    }

    /// Returns the session called `name`, loading it on first use.
    ///
    /// # Errors
    /// Store and codec errors, unchanged. A failed load is not cached.
    pub async fn get(&self, name: &str) -> Result<Session, SatchelError> {
        let mut registry = self.registry.lock().await;
        if let Some(session) = registry.get(name) {
            return Ok(session.clone());
        }

        let session = self.store.load(&self.ctx, name).await?;
        registry.insert(name.to_string(), session.clone());
        Ok(session)
    }

    /// Like [`get`](Self::get), but an unreadable session (bad signature,
    /// expired, unreachable backend) is replaced by a new one.
    pub async fn get_or_new(&self, name: &str) -> Session {
        match self.get(name).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session = %name, error = %e, "discarding unreadable session");
                let session = self.store.new_session(name);
                self.registry
                    .lock()
                    .await
                    .insert(name.to_string(), session.clone());
                session
            }
        }
    }

    /// A fresh session with the store's defaults, ignoring the request.
    pub fn new_session(&self, name: &str) -> Session {
        self.store.new_session(name)
    }

    /// Persists `session` and queues its cookie for the response.
    ///
    /// Set `session.options.max_age` to `0` or less first to delete it.
    ///
    /// # Errors
    /// Store and codec errors, unchanged.
    pub async fn save(&self, session: &mut Session) -> Result<(), SatchelError> {
        {
            let mut cookies = self.cookies.lock().await;
            self.store.save(session, &mut cookies).await?;
        }
        self.registry
            .lock()
            .await
            .insert(session.name().to_string(), session.clone());
        Ok(())
    }

    /// Saves every session this request has loaded, in name order.
    ///
    /// Only the cached copies are saved: changes made to a `Session` value
    /// that was never passed to [`save`](Self::save) are not visible here.
    ///
    /// # Errors
    /// Stops at the first failing save.
    pub async fn save_all(&self) -> Result<(), SatchelError> {
        let mut sessions: Vec<Session> =
            self.registry.lock().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.name().cmp(b.name()));

        for session in &mut sessions {
            self.save(session).await?;
        }
        Ok(())
    }

    /// What was captured from the request for session lookup.
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Moves every queued cookie into `Set-Cookie` response headers.
    pub(crate) async fn write_cookies(&self, headers: &mut HeaderMap) {
        let cookies = self.cookies.lock().await.drain();
        for cookie in cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => {
                    tracing::warn!(
                        cookie = %cookie.name(),
                        error = %e,
                        "dropping cookie that is not a valid header value"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for RequestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSession").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Sessions (request extension + extractor)
// ---------------------------------------------------------------------------

/// Every [`RequestSession`] attached to a request, keyed by layer key.
///
/// Stack several layers with different keys to use several stores at
/// once (say, a cookie store for preferences and Redis for the login).
///
/// ```rust,ignore
/// async fn handler(sessions: Sessions) -> Result<String, SatchelError> {
///     let handle = sessions.get("session")?;
///     let mut session = handle.get("sid").await?;
///     session.insert("seen", true)?;
///     handle.save(&mut session).await?;
///     Ok("ok".into())
/// }
/// ```
#[derive(Clone, Default, Debug)]
pub struct Sessions {
    handles: HashMap<String, RequestSession>,
}

impl Sessions {
    /// The handle installed under `key`.
    ///
    /// # Errors
    /// [`SatchelError::MissingSession`] if no layer uses that key.
    pub fn get(&self, key: &str) -> Result<RequestSession, SatchelError> {
        self.handles
            .get(key)
            .cloned()
            .ok_or_else(|| SatchelError::MissingSession(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub(crate) fn insert(&mut self, key: String, handle: RequestSession) {
        self.handles.insert(key, handle);
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Sessions {
    type Rejection = SatchelError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Sessions>()
            .cloned()
            .ok_or(SatchelError::MissingLayer)
    }
}

/// Looks up the handle installed under `key` in request extensions.
///
/// # Errors
/// - [`SatchelError::MissingLayer`]: no session layer ran
/// - [`SatchelError::MissingSession`]: no layer uses `key`
pub fn get_request_session(
    extensions: &Extensions,
    key: &str,
) -> Result<RequestSession, SatchelError> {
    extensions
        .get::<Sessions>()
        .ok_or(SatchelError::MissingLayer)?
        .get(key)
}
