//! `SessionLayer` builder and the tower service it produces.
//!
//! This is the entry point for using Satchel. It ties the layers together:
//! request → lookup context → store → per-request handle → response cookies.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, BodyDataStream};
use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::{StreamExt, stream};
use http::{Request, Response};
use satchel_store::{RequestContext, Store, is_json_content_type};
use serde::{Deserialize, Serialize};
use tower::{Layer, Service};

use crate::handle::{ErasedStore, RequestSession};
use crate::{SessionOption, Sessions};

/// Key the handle is stored under when none is configured.
pub const DEFAULT_SESSION_KEY: &str = "session";

/// Largest JSON body buffered for session lookup when none is configured.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Serializable layer settings, for loading from a config file.
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLayerConfig {
    /// Key handlers use to find this layer's handle.
    pub key: String,
    /// Largest JSON body buffered for session lookup.
    pub max_body_bytes: usize,
}

impl Default for SessionLayerConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_SESSION_KEY.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// State shared by every request a layer handles.
///
/// Wrapped in `Arc` so each service clone (and each request) shares it.
struct LayerState {
    store: Arc<dyn ErasedStore>,
    key: String,
    max_body_bytes: usize,
}

impl LayerState {
    /// Captures the lookup context, attaches a fresh handle to the request
    /// extensions, and hands the (possibly rebuilt) request back.
    async fn attach(&self, req: Request<Body>) -> (Request<Body>, RequestSession) {
        let (mut parts, body) = req.into_parts();
        let mut ctx = RequestContext::from_parts(&parts);

        // Only JSON bodies can hold a session value. Whatever happens while
        // reading, the handler gets every byte the client sent.
        let body = if is_json_content_type(&parts.headers) {
            match read_body(body, self.max_body_bytes).await {
                BodyRead::Complete(bytes) => {
                    ctx = ctx.with_json_body(bytes.clone());
                    Body::from(bytes)
                }
                BodyRead::OverLimit { read, rest } => {
                    tracing::debug!(
                        limit = self.max_body_bytes,
                        "JSON body over limit, not used for session lookup"
                    );
                    ctx = ctx.with_body_error(format!(
                        "JSON body exceeds {} bytes",
                        self.max_body_bytes
                    ));
                    Body::from_stream(stream::iter(read.into_iter().map(Ok)).chain(rest))
                }
                BodyRead::Failed { read, error } => {
                    tracing::debug!(error = %error, "failed to read JSON body");
                    ctx = ctx.with_body_error(&error);
                    let replay = read
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(error)));
                    Body::from_stream(stream::iter(replay))
                }
            }
        } else {
            body
        };

        let handle = RequestSession::new(ctx, Arc::clone(&self.store));
        let mut sessions = parts.extensions.remove::<Sessions>().unwrap_or_default();
        if sessions.keys().any(|k| k == self.key) {
            tracing::warn!(key = %self.key, "session key already used by an outer layer, replacing it");
        }
        sessions.insert(self.key.clone(), handle.clone());
        parts.extensions.insert(sessions);

        (Request::from_parts(parts, body), handle)
    }
}

/// How far [`read_body`] got.
enum BodyRead {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// The limit was passed: the chunks read so far and the unread rest.
    OverLimit {
        read: Vec<Bytes>,
        rest: BodyDataStream,
    },
    /// The stream failed after `read`.
    Failed {
        read: Vec<Bytes>,
        error: axum::Error,
    },
}

/// Reads `body` chunk by chunk, stopping as soon as more than `limit`
/// bytes have arrived.
async fn read_body(body: Body, limit: usize) -> BodyRead {
    let mut stream = body.into_data_stream();
    let mut read = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                total += chunk.len();
                read.push(chunk);
                if total > limit {
                    return BodyRead::OverLimit { read, rest: stream };
                }
            }
            Err(error) => return BodyRead::Failed { read, error },
        }
    }

    let mut whole = BytesMut::with_capacity(total);
    for chunk in read {
        whole.extend_from_slice(&chunk);
    }
    BodyRead::Complete(whole.freeze())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`SessionLayer`].
///
/// # Example
///
/// ```rust,ignore
/// use satchel::prelude::*;
///
/// let store = CookieStore::new(&[secret])?;
/// let layer = SessionLayer::builder(store)
///     .key("session")
///     .option(SessionOption::MaxAge(3600))
///     .build();
/// let app = Router::new().route("/", get(handler)).layer(layer);
/// ```
pub struct SessionLayerBuilder<S> {
    store: S,
    config: SessionLayerConfig,
    options: Vec<SessionOption>,
}

impl<S: Store> SessionLayerBuilder<S> {
    /// Creates a builder with default settings.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: SessionLayerConfig::default(),
            options: Vec::new(),
        }
    }

    /// Sets the key handlers use to find this layer's handle.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.config.key = key.into();
        self
    }

    /// Adds an option, applied to the store by [`build`](Self::build).
    /// Later options override earlier ones.
    pub fn option(mut self, option: SessionOption) -> Self {
        self.options.push(option);
        self
    }

    /// Adds several options in order.
    pub fn options(mut self, options: impl IntoIterator<Item = SessionOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Sets the largest JSON body buffered for session lookup.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.config.max_body_bytes = limit;
        self
    }

    /// Replaces key and body limit with a loaded configuration.
    pub fn config(mut self, config: SessionLayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies the options to the store and builds the layer.
    pub fn build(mut self) -> SessionLayer {
        for option in &self.options {
            option.apply(&mut self.store);
        }

        let key = if self.config.key.is_empty() {
            DEFAULT_SESSION_KEY.to_string()
        } else {
            self.config.key
        };
        tracing::debug!(
            key = %key,
            options = self.options.len(),
            "session layer built"
        );

        SessionLayer {
            state: Arc::new(LayerState {
                store: Arc::new(self.store),
                key,
                max_body_bytes: self.config.max_body_bytes,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Layer + Service
// ---------------------------------------------------------------------------

/// Tower layer that gives every request a [`RequestSession`].
///
/// Cheap to clone: the store is shared.
#[derive(Clone)]
pub struct SessionLayer {
    state: Arc<LayerState>,
}

impl SessionLayer {
    /// Creates a builder for a layer over `store`.
    pub fn builder<S: Store>(store: S) -> SessionLayerBuilder<S> {
        SessionLayerBuilder::new(store)
    }

    /// A layer over `store` with default key and no options.
    pub fn new<S: Store>(store: S) -> Self {
        Self::builder(store).build()
    }

    /// The key handlers use to find this layer's handle.
    pub fn key(&self) -> &str {
        &self.state.key
    }
}

impl std::fmt::Debug for SessionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLayer")
            .field("key", &self.state.key)
            .field("max_body_bytes", &self.state.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl<I> Layer<I> for SessionLayer {
    type Service = SessionService<I>;

    fn layer(&self, inner: I) -> Self::Service {
        SessionService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

/// The service produced by [`SessionLayer`].
#[derive(Clone)]
pub struct SessionService<I> {
    inner: I,
    state: Arc<LayerState>,
}

impl<I, ResBody> Service<Request<Body>> for SessionService<I>
where
    I: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    I::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = I::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // The clone is not ready yet; keep the ready one for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let (req, handle) = state.attach(req).await;
            let mut response = inner.call(req).await?;
            handle.write_cookies(response.headers_mut()).await;
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use satchel_store::CookieStore;

    use super::*;

    fn store() -> CookieStore {
        CookieStore::new(&[b"layer-test-key"]).unwrap()
    }

    #[test]
    fn test_config_default_values() {
        let config = SessionLayerConfig::default();
        assert_eq!(config.key, "session");
        assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_config_missing_fields_take_defaults() {
        let config: SessionLayerConfig =
            serde_json::from_str(r#"{"key":"admin"}"#).unwrap();
        assert_eq!(config.key, "admin");
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn test_build_default_key() {
        let layer = SessionLayer::new(store());
        assert_eq!(layer.key(), DEFAULT_SESSION_KEY);
    }

    #[test]
    fn test_build_empty_key_falls_back_to_default() {
        let layer = SessionLayer::builder(store()).key("").build();
        assert_eq!(layer.key(), DEFAULT_SESSION_KEY);
    }

    #[test]
    fn test_builder_config_overrides_key_and_limit() {
        let layer = SessionLayer::builder(store())
            .config(SessionLayerConfig {
                key: "prefs".into(),
                max_body_bytes: 16,
            })
            .build();
        assert_eq!(layer.key(), "prefs");
        assert_eq!(layer.state.max_body_bytes, 16);
    }

    #[tokio::test]
    async fn test_attach_json_body_is_buffered_and_passed_on() {
        let layer = SessionLayer::new(store());
        let req = Request::builder()
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"sid":"abc"}"#))
            .unwrap();

        let (req, handle) = layer.state.attach(req).await;

        assert_eq!(
            handle.context().json_field("sid").unwrap().as_deref(),
            Some("abc")
        );
        let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"sid":"abc"}"#);
    }

    #[tokio::test]
    async fn test_attach_oversized_body_defers_error_and_keeps_body() {
        let layer = SessionLayer::builder(store()).max_body_bytes(4).build();
        let req = Request::builder()
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"sid":"abc"}"#))
            .unwrap();

        let (req, handle) = layer.state.attach(req).await;

        assert!(handle.context().json_field("sid").is_err());
        let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"sid":"abc"}"#);
    }

    #[tokio::test]
    async fn test_attach_inserts_handle_under_key() {
        let layer = SessionLayer::builder(store()).key("prefs").build();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let (req, _handle) = layer.state.attach(req).await;

        let sessions = req.extensions().get::<Sessions>().unwrap();
        assert!(sessions.get("prefs").is_ok());
        assert!(sessions.get(DEFAULT_SESSION_KEY).is_err());
    }
}
