//! Integration tests for `RedisStore`.
//!
//! These run against an in-memory `RemoteClient` instead of a real Redis
//! server, so they check exactly what the store asks the backend to do:
//! which keys, which TTLs, which deletes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use http::{HeaderMap, HeaderValue, Uri, header::COOKIE};
use satchel_store::{
    ConfigStore, DEFAULT_KEY_PREFIX, KeyPair, RedisStore, RemoteClient,
    RequestContext, ResponseCookies, Store, StoreError,
};

// =========================================================================
// In-memory backend
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
struct Record {
    value: String,
    ttl_secs: u64,
}

/// Records every write with its TTL. Cloning shares the same map, so a
/// test can keep a handle after giving one to the store.
#[derive(Clone, Default)]
struct MemoryClient {
    records: Arc<Mutex<HashMap<String, Record>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    fail_writes: bool,
}

impl MemoryClient {
    fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    fn record(&self, key: &str) -> Option<Record> {
        self.records.lock().unwrap().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn remove(&self, key: &str) {
        self.records.lock().unwrap().remove(key);
    }
}

impl RemoteClient for MemoryClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.record(key).map(|r| r.value))
    }

    async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("connection refused".into()));
        }
        self.records.lock().unwrap().insert(
            key.to_string(),
            Record {
                value: value.to_string(),
                ttl_secs,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.records.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

const KEY: &[u8] = b"redis-store-test-key";

fn store_with(client: MemoryClient) -> RedisStore<MemoryClient> {
    RedisStore::new(client, &[KEY]).expect("valid key")
}

/// Sends the queued cookies back the way a browser would.
fn ctx_from(jar: &ResponseCookies) -> RequestContext {
    let header = jar
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ");
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&header).unwrap());
    RequestContext::new(headers, &Uri::from_static("/"))
}

// =========================================================================
// Round trip
// =========================================================================

#[tokio::test]
async fn test_save_then_load_returns_same_values() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.insert("user_id", 7).unwrap();
    session.insert("roles", vec!["admin", "editor"]).unwrap();
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();
    let loaded = store.load(&ctx_from(&jar), "sid").await.unwrap();

    assert!(!loaded.is_new);
    assert_eq!(loaded.id, session.id);
    assert_eq!(loaded.values, session.values);
}

#[tokio::test]
async fn test_load_id_from_query_param_finds_record() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.insert("k", "v").unwrap();
    let mut jar = ResponseCookies::new();
    store.save(&mut session, &mut jar).await.unwrap();
    let encoded_id = jar.get("sid").unwrap().value().to_string();

    let uri: Uri = format!("/?sid={encoded_id}").parse().unwrap();
    let ctx = RequestContext::new(HeaderMap::new(), &uri);
    let loaded = store.load(&ctx, "sid").await.unwrap();

    assert_eq!(loaded.get::<String>("k").unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn test_encrypted_store_round_trip_record_needs_block_key() {
    let client = MemoryClient::default();
    let store = RedisStore::from_pairs(
        client.clone(),
        &[KeyPair::encrypting(KEY.to_vec(), b"redis-store-block-key-32-bytes!!!".to_vec())],
    )
    .unwrap();
    let mut session = store.new_session("sid");
    session.insert("card", "4111-1111").unwrap();
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();
    let loaded = store.load(&ctx_from(&jar), "sid").await.unwrap();

    assert_eq!(loaded.values, session.values);
    let record = client.record(&store.session_key(&session.id)).unwrap();
    let signing_only = satchel_codec::SecureCookie::new(KEY.to_vec()).unwrap();
    assert!(
        signing_only
            .decode::<serde_json::Value>("sid", &record.value)
            .is_err(),
        "record must not be readable without the block key"
    );
}

// =========================================================================
// save()
// =========================================================================

#[tokio::test]
async fn test_save_new_session_assigns_uuid_and_prefixed_key() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();

    assert_eq!(session.id.len(), 36, "expected a hyphenated uuid");
    assert_eq!(
        client.keys(),
        vec![format!("{DEFAULT_KEY_PREFIX}:{}", session.id)]
    );
}

#[tokio::test]
async fn test_save_uses_max_age_as_ttl() {
    let client = MemoryClient::default();
    let mut store = store_with(client.clone());
    store.set_max_age(900);
    let mut session = store.new_session("sid");
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();

    let record = client.record(&store.session_key(&session.id)).unwrap();
    assert_eq!(record.ttl_secs, 900);
    let cookie = jar.get("sid").unwrap();
    assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(900));
}

#[tokio::test]
async fn test_save_cookie_carries_signed_id_not_data() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.insert("secret", "x".repeat(300)).unwrap();
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();

    let cookie_value = jar.get("sid").unwrap().value().to_string();
    let decoded_id: String = store.codecs()[0].decode("sid", &cookie_value).unwrap();
    assert_eq!(decoded_id, session.id);
    assert!(cookie_value.len() < 300);
}

#[tokio::test]
async fn test_save_existing_id_is_kept() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.id = "fixed-id".to_string();
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();

    assert_eq!(session.id, "fixed-id");
    assert!(client.record("_session:fixed-id").is_some());
}

#[tokio::test]
async fn test_save_custom_prefix_changes_key_layout() {
    let client = MemoryClient::default();
    let store = store_with(client.clone()).with_prefix("shop");
    let mut session = store.new_session("cart");
    session.id = "abc".to_string();
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();

    assert_eq!(client.keys(), vec!["shop:abc".to_string()]);
}

#[tokio::test]
async fn test_save_empty_prefix_falls_back_to_default() {
    let mut store = store_with(MemoryClient::default());

    store.set_prefix("");

    assert_eq!(store.prefix(), DEFAULT_KEY_PREFIX);
    assert_eq!(store.session_key("id"), "_session:id");
}

#[tokio::test]
async fn test_save_backend_failure_returns_error_and_no_cookie() {
    let store = store_with(MemoryClient::failing());
    let mut session = store.new_session("sid");
    let mut jar = ResponseCookies::new();

    let result = store.save(&mut session, &mut jar).await;

    assert!(matches!(result, Err(StoreError::Backend(_))));
    assert!(jar.is_empty());
}

// =========================================================================
// Deletion
// =========================================================================

#[tokio::test]
async fn test_save_non_positive_max_age_deletes_record_and_expires_cookie() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.insert("k", 1).unwrap();
    let mut jar = ResponseCookies::new();
    store.save(&mut session, &mut jar).await.unwrap();
    let key = store.session_key(&session.id);
    assert!(client.record(&key).is_some());

    session.options.max_age = 0;
    let mut jar = ResponseCookies::new();
    store.save(&mut session, &mut jar).await.unwrap();

    assert!(client.record(&key).is_none());
    assert_eq!(client.deleted(), vec![key]);
    let cookie = jar.get("sid").unwrap();
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(0));
}

#[tokio::test]
async fn test_save_delete_without_id_skips_backend() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.options.max_age = -1;
    let mut jar = ResponseCookies::new();

    store.save(&mut session, &mut jar).await.unwrap();

    assert!(client.deleted().is_empty());
    assert_eq!(jar.len(), 1);
}

// =========================================================================
// load()
// =========================================================================

#[tokio::test]
async fn test_load_without_cookie_returns_new_session() {
    let store = store_with(MemoryClient::default());

    let session = store.load(&RequestContext::default(), "sid").await.unwrap();

    assert!(session.is_new);
    assert!(session.id.is_empty());
}

#[tokio::test]
async fn test_load_missing_record_returns_new_session_keeping_id() {
    let client = MemoryClient::default();
    let store = store_with(client.clone());
    let mut session = store.new_session("sid");
    session.insert("k", 1).unwrap();
    let mut jar = ResponseCookies::new();
    store.save(&mut session, &mut jar).await.unwrap();
    client.remove(&store.session_key(&session.id));

    let loaded = store.load(&ctx_from(&jar), "sid").await.unwrap();

    assert!(loaded.is_new);
    assert!(loaded.is_empty());
    assert_eq!(loaded.id, session.id);
}

#[tokio::test]
async fn test_load_forged_id_returns_codec_error() {
    let store = store_with(MemoryClient::default());
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_static("sid=c29tZS1pZA=="));
    let ctx = RequestContext::new(headers, &Uri::from_static("/"));

    let result = store.load(&ctx, "sid").await;

    assert!(matches!(result, Err(StoreError::Codec(_))));
}

#[tokio::test]
async fn test_load_record_for_other_session_name_is_rejected() {
    // Copy a "cart" record under the key of a "sid" session: the payload
    // is signed for "cart", so it must not decode as "sid".
    let client = MemoryClient::default();
    let store = store_with(client.clone());

    let mut cart = store.new_session("cart");
    cart.id = "shared".into();
    cart.insert("items", 3).unwrap();
    store.save(&mut cart, &mut ResponseCookies::new()).await.unwrap();

    let encoded_id = store.codecs()[0].encode("sid", "shared").unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&format!("sid={encoded_id}")).unwrap(),
    );
    let ctx = RequestContext::new(headers, &Uri::from_static("/"));

    let result = store.load(&ctx, "sid").await;

    assert!(matches!(result, Err(StoreError::Codec(_))));
}
