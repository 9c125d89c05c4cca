//! Visit counter with flash messages.
//!
//! Environment:
//! - `SATCHEL_SECRET`: signing key (a random one is generated if unset,
//!   so sessions won't survive a restart)
//! - `SATCHEL_REDIS_URL`: keep session data in Redis instead of the cookie
//! - `SATCHEL_BIND`: listen address, `127.0.0.1:3000` by default
//! - `RUST_LOG`: log filter, e.g. `satchel=debug`

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use satchel::prelude::*;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const SESSION_NAME: &str = "counter";

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn count(sessions: Sessions) -> Result<Json<Value>, SatchelError> {
    let handle = sessions.get(satchel::DEFAULT_SESSION_KEY)?;
    let mut session = handle.get_or_new(SESSION_NAME).await;

    let visits = session.get::<u64>("visits")?.unwrap_or(0) + 1;
    session.insert("visits", visits)?;
    let flashes = session.flashes();
    handle.save(&mut session).await?;

    Ok(Json(json!({ "visits": visits, "flashes": flashes })))
}

#[derive(serde::Deserialize)]
struct FlashQuery {
    msg: String,
}

async fn flash(
    sessions: Sessions,
    Query(query): Query<FlashQuery>,
) -> Result<&'static str, SatchelError> {
    let handle = sessions.get(satchel::DEFAULT_SESSION_KEY)?;
    let mut session = handle.get_or_new(SESSION_NAME).await;
    session.add_flash(query.msg)?;
    handle.save(&mut session).await?;
    Ok("queued")
}

async fn reset(sessions: Sessions) -> Result<&'static str, SatchelError> {
    let handle = sessions.get(satchel::DEFAULT_SESSION_KEY)?;
    let mut session = handle.get_or_new(SESSION_NAME).await;
    session.options.max_age = -1;
    handle.save(&mut session).await?;
    Ok("reset")
}

fn router(layer: SessionLayer) -> Router {
    Router::new()
        .route("/", get(count))
        .route("/flash", get(flash))
        .route("/reset", get(reset))
        .layer(layer)
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

async fn session_layer(secret: &[u8]) -> Result<SessionLayer, Box<dyn std::error::Error>> {
    let max_age = SessionOption::MaxAge(24 * 3600);
    let layer = match std::env::var("SATCHEL_REDIS_URL") {
        Ok(url) => {
            let client = redis::Client::open(url.as_str())?;
            let conn = client.get_connection_manager().await?;
            tracing::info!(url = %url, "storing sessions in redis");
            let store = RedisStore::new(conn, &[secret])?.with_prefix("counter");
            SessionLayer::builder(store).option(max_age).build()
        }
        Err(_) => {
            tracing::info!("storing sessions in cookies");
            SessionLayer::builder(CookieStore::new(&[secret])?)
                .option(max_age)
                .build()
        }
    };
    Ok(layer)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let secret = match std::env::var("SATCHEL_SECRET") {
        Ok(secret) => secret.into_bytes(),
        Err(_) => {
            tracing::warn!("SATCHEL_SECRET not set, using a random signing key");
            generate_random_key(32)
        }
    };
    let bind = std::env::var("SATCHEL_BIND").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    let app = router(session_layer(&secret).await?);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "counter listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::header::{COOKIE, SET_COOKIE};
    use http::{Request, Response};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let store = CookieStore::new(&[b"counter-test-key"]).unwrap();
        router(SessionLayer::new(store))
    }

    async fn send(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }
        app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn cookie_of(response: &Response<Body>) -> String {
        let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        header.split(';').next().unwrap().to_string()
    }

    async fn json_of(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_count_increments_across_requests() {
        let app = app();

        let first = send(&app, "/", None).await;
        let cookie = cookie_of(&first);
        assert_eq!(json_of(first).await["visits"], json!(1));

        let second = send(&app, "/", Some(&cookie)).await;
        assert_eq!(json_of(second).await["visits"], json!(2));
    }

    #[tokio::test]
    async fn test_flash_is_shown_once() {
        let app = app();
        let queued = send(&app, "/flash?msg=hello", None).await;
        let cookie = cookie_of(&queued);

        let shown = send(&app, "/", Some(&cookie)).await;
        let cookie = cookie_of(&shown);
        assert_eq!(json_of(shown).await["flashes"], json!(["hello"]));

        let again = send(&app, "/", Some(&cookie)).await;
        assert_eq!(json_of(again).await["flashes"], json!([]));
    }

    #[tokio::test]
    async fn test_reset_expires_cookie() {
        let app = app();
        let first = send(&app, "/", None).await;
        let cookie = cookie_of(&first);

        let reset = send(&app, "/reset", Some(&cookie)).await;

        let header = reset.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(header.contains("Max-Age=0"));
    }
}
