//! Integration tests for the relay flows, driven through the full router.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use relay_gateway::api::create_router;
use relay_gateway::app::AppState;
use relay_gateway::test_utils::{MockDocumentStore, MockKvStore, MockLlmClient};

const API_KEY: &str = "integration-secret";

struct TestHarness {
    router: Router,
    kv: Arc<MockKvStore>,
    llm: Arc<MockLlmClient>,
    documents: Arc<MockDocumentStore>,
}

fn harness() -> TestHarness {
    let llm = Arc::new(MockLlmClient::new());
    let kv = Arc::new(MockKvStore::new());
    let documents = Arc::new(MockDocumentStore::new());

    let state = Arc::new(AppState::new(
        llm.clone(),
        kv.clone(),
        documents.clone(),
        SecretString::from(API_KEY.to_string()),
        "test".to_string(),
    ));

    TestHarness {
        router: create_router(state),
        kv,
        llm,
        documents,
    }
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY);
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_kv_set_then_get_round_trips() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/redis/set",
            Some(json!({"key": "k1", "value": {"a": 1}, "ttl": 60})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["key"], "k1");
    assert_eq!(body["ttl"], 60);

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/get/k1", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["value"], json!({"a": 1}));
}

#[tokio::test]
async fn test_kv_get_absent_key_is_null() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/get/missing", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["value"], Value::Null);
}

#[tokio::test]
async fn test_kv_delete_absent_key_is_not_an_error() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed("DELETE", "/api/redis/delete/nonexistent-key", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["deleted"], json!(false));
    assert_eq!(body["message"], "Key not found");
}

#[tokio::test]
async fn test_kv_corrupted_entry_reads_back_as_raw_string() {
    let h = harness();
    h.kv.insert_raw("corrupt", "not-json{");

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/get/corrupt", None))
        .await
        .unwrap();

    // Silent fallback: a corrupted entry must never produce a 500.
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["value"], "not-json{");
}

#[tokio::test]
async fn test_kv_set_missing_value_is_400() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed(
            "POST",
            "/api/redis/set",
            Some(json!({"key": "k1"})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], "Key and value are required");
}

#[tokio::test]
async fn test_hash_operations_flow() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/redis/hash/set",
            Some(json!({"key": "user:1", "field": "profile", "value": {"name": "Ann"}})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = h
        .router
        .clone()
        .oneshot(authed("GET", "/api/redis/hash/get/user:1/profile", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["value"], json!({"name": "Ann"}));

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/hash/getall/user:1", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["hash"]["profile"], json!({"name": "Ann"}));
}

#[tokio::test]
async fn test_list_push_and_range() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/redis/list/push",
            Some(json!({"key": "queue", "values": [1, 2, 3]})),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["length"], 3);

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/list/range/queue?start=0&stop=-1", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["values"], json!([1, 2, 3]));
}

#[tokio::test]
async fn test_set_add_and_members() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/redis/set/add",
            Some(json!({"key": "tags", "members": ["a", "b", "a"]})),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["added"], 2);

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/set/members/tags", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/redis/session/create",
            Some(json!({
                "sessionId": "s1",
                "userId": "u42",
                "data": {"theme": "dark"},
                "ttl": 120
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["sessionId"], "s1");
    assert_eq!(body["ttl"], 120);

    let res = h
        .router
        .clone()
        .oneshot(authed("GET", "/api/redis/session/s1", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["data"]["userId"], "u42");
    assert_eq!(body["data"]["theme"], "dark");
    assert!(body["data"]["lastAccessed"].is_string());

    let res = h
        .router
        .clone()
        .oneshot(authed("DELETE", "/api/redis/session/s1", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["deleted"], json!(true));

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/session/s1", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], "Session not found");
}

#[tokio::test]
async fn test_cache_endpoints_report_cached_flag() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed("GET", "/api/redis/cache/prefs", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["cached"], json!(false));

    h.router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/redis/cache/set",
            Some(json!({"key": "prefs", "value": {"theme": "dark"}})),
        ))
        .await
        .unwrap();

    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/cache/prefs", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["cached"], json!(true));
    assert_eq!(body["value"], json!({"theme": "dark"}));
}

#[tokio::test]
async fn test_bedrock_invoke_success_envelope() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed(
            "POST",
            "/api/bedrock/invoke",
            Some(json!({"prompt": "hi"})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["response"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("hi"));
    assert_eq!(h.llm.call_count(), 1);
}

#[tokio::test]
async fn test_bedrock_batch_partial_failure() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed(
            "POST",
            "/api/bedrock/batch",
            Some(json!({"prompts": ["one", "", "three"]})),
        ))
        .await
        .unwrap();

    // The batch call itself succeeds; only the bad entry fails.
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["success"], json!(true));
    assert_eq!(results[1]["success"], json!(false));
    assert!(results[1]["error"].as_str().unwrap().contains("prompt"));
    assert_eq!(results[2]["success"], json!(true));
}

#[tokio::test]
async fn test_bedrock_batch_requires_prompts_array() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed("POST", "/api/bedrock/batch", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"], "prompts must be an array");
}

#[tokio::test]
async fn test_document_store_crud_flow() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/supabase/data/contacts",
            Some(json!({"data": {"id": "c1", "name": "Acme", "status": "active"}})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["data"][0]["name"], "Acme");

    let filter = "{\"status\":\"active\"}";
    let uri = format!(
        "/api/supabase/data/contacts?filter={}&limit=10",
        urlencode(filter)
    );
    let res = h
        .router
        .clone()
        .oneshot(authed("GET", &uri, None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let res = h
        .router
        .clone()
        .oneshot(authed(
            "PUT",
            "/api/supabase/data/contacts/c1",
            Some(json!({"data": {"status": "archived"}})),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["data"][0]["status"], "archived");

    let res = h
        .router
        .clone()
        .oneshot(authed("DELETE", "/api/supabase/data/contacts/c1", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["message"], "Record deleted successfully");

    let res = h
        .router
        .oneshot(authed("GET", "/api/supabase/data/contacts", None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    assert!(h.documents.call_count() >= 5);
}

#[tokio::test]
async fn test_document_query_bad_filter_is_400() {
    let h = harness();

    let res = h
        .router
        .oneshot(authed(
            "GET",
            "/api/supabase/data/contacts?filter=notjson",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_health_reports_all_services() {
    let h = harness();

    let res = h
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["bedrock"], "healthy");
    assert_eq!(body["services"]["supabase"], "healthy");
    assert_eq!(body["services"]["redis"], "healthy");
}

#[tokio::test]
async fn test_health_degrades_when_backend_down() {
    let h = harness();
    h.kv.set_healthy(false);

    let res = h
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["services"]["redis"], "unhealthy");
    assert_eq!(body["services"]["bedrock"], "healthy");
}

#[tokio::test]
async fn test_backend_health_endpoint_behind_auth() {
    let h = harness();

    let res = h
        .router
        .clone()
        .oneshot(authed("GET", "/api/redis/health", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["service"], "redis-relay");

    h.kv.set_healthy(false);
    let res = h
        .router
        .oneshot(authed("GET", "/api/redis/health", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// Minimal percent-encoding for test URIs.
fn urlencode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{other:02X}"),
        })
        .collect()
}
