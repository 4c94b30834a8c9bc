//! HTTP request handlers for the relay surface.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::error;

use crate::app::AppState;
use crate::domain::{
    AppError, BackendHealth, BatchInvokeRequest, BatchInvokeResponse, CacheValueResponse,
    DocDeleteResponse, DocQueryParams, DocRowsResponse, DocStoreError, DocWriteRequest,
    ErrorBody, HashAllResponse, HashFieldResponse, HashSetRequest, HashSetResponse,
    HealthResponse, HealthStatus, InvokeRequest, InvokeResponse, KvDeleteResponse,
    KvError, KvSetResponse, KvStatsResponse, KvValueResponse, ListPushRequest,
    ListPushResponse, ListRangeParams, ListRangeResponse, LlmError, NotFoundBody,
    SessionCreateRequest, SessionCreateResponse, SessionResponse, SetAddRequest,
    SetAddResponse, SetKeyRequest, SetMembersResponse, StoredValue, TableError,
};

const SESSION_PREFIX: &str = "session:";
const CACHE_PREFIX: &str = "cache:";
const DEFAULT_SESSION_TTL: u64 = 3600;
const DEFAULT_CACHE_TTL: u64 = 3600;

// ---------------------------------------------------------------------------
// Service surface
// ---------------------------------------------------------------------------

/// Service index at the root.
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Relay Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "services": {
            "bedrock": "/api/bedrock",
            "supabase": "/api/supabase",
            "redis": "/api/redis"
        }
    }))
}

/// Aggregate health across all backends.
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Prometheus scrape output.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> axum::response::Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Unknown-route fallback.
pub async fn not_found_handler(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundBody {
            success: false,
            error: "Endpoint not found".to_string(),
            path: uri.path().to_string(),
            method: method.to_string(),
            timestamp: Utc::now(),
        }),
    )
}

fn backend_health(service: &str, result: Result<(), AppError>) -> (StatusCode, Json<BackendHealth>) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(BackendHealth {
                status: HealthStatus::Healthy,
                service: service.to_string(),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(BackendHealth {
                status: HealthStatus::Unhealthy,
                service: service.to_string(),
                error: Some(e.to_string()),
            }),
        ),
    }
}

// ---------------------------------------------------------------------------
// LLM relay
// ---------------------------------------------------------------------------

pub async fn bedrock_health_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<BackendHealth>) {
    backend_health("bedrock-relay", state.llm.health_check().await)
}

pub async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, AppError> {
    let response = state.service.invoke_model(&payload).await?;
    Ok(Json(InvokeResponse {
        success: true,
        response,
    }))
}

pub async fn batch_invoke_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchInvokeRequest>,
) -> Result<Json<BatchInvokeResponse>, AppError> {
    let prompts = payload.require()?;
    let results = state.service.batch_invoke(prompts).await;
    Ok(Json(BatchInvokeResponse {
        success: true,
        results,
    }))
}

// ---------------------------------------------------------------------------
// Key-value relay
// ---------------------------------------------------------------------------

pub async fn redis_health_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<BackendHealth>) {
    backend_health("redis-relay", state.kv.health_check().await)
}

pub async fn kv_get_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<KvValueResponse>, AppError> {
    let value = state.kv.get(&key).await?;
    Ok(Json(KvValueResponse {
        success: true,
        key,
        value,
    }))
}

pub async fn kv_set_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetKeyRequest>,
) -> Result<Json<KvSetResponse>, AppError> {
    let (key, value) = payload.require()?;
    state.kv.set(key, value, payload.ttl).await?;
    Ok(Json(KvSetResponse {
        success: true,
        message: "Key set successfully".to_string(),
        key: key.to_string(),
        ttl: payload.ttl,
    }))
}

pub async fn kv_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<KvDeleteResponse>, AppError> {
    let deleted = state.kv.delete(&key).await?;
    Ok(Json(KvDeleteResponse {
        success: true,
        message: if deleted {
            "Key deleted successfully".to_string()
        } else {
            "Key not found".to_string()
        },
        deleted,
    }))
}

pub async fn hash_set_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HashSetRequest>,
) -> Result<Json<HashSetResponse>, AppError> {
    let (key, field, value) = payload.require()?;
    state.kv.hash_set(key, field, value).await?;
    Ok(Json(HashSetResponse {
        success: true,
        message: "Hash field set successfully".to_string(),
        key: key.to_string(),
        field: field.to_string(),
    }))
}

pub async fn hash_get_handler(
    State(state): State<Arc<AppState>>,
    Path((key, field)): Path<(String, String)>,
) -> Result<Json<HashFieldResponse>, AppError> {
    let value = state.kv.hash_get(&key, &field).await?;
    Ok(Json(HashFieldResponse {
        success: true,
        key,
        field,
        value,
    }))
}

pub async fn hash_get_all_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<HashAllResponse>, AppError> {
    let hash = state.kv.hash_get_all(&key).await?;
    Ok(Json(HashAllResponse {
        success: true,
        key,
        hash,
    }))
}

pub async fn list_push_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ListPushRequest>,
) -> Result<Json<ListPushResponse>, AppError> {
    let (key, values) = payload.require()?;
    let length = state.kv.list_push(key, values, payload.direction).await?;
    Ok(Json(ListPushResponse {
        success: true,
        message: "Values pushed to list".to_string(),
        key: key.to_string(),
        length,
    }))
}

pub async fn list_range_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<ListRangeParams>,
) -> Result<Json<ListRangeResponse>, AppError> {
    let values = state.kv.list_range(&key, params.start, params.stop).await?;
    Ok(Json(ListRangeResponse {
        success: true,
        key,
        values,
    }))
}

pub async fn set_add_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetAddRequest>,
) -> Result<Json<SetAddResponse>, AppError> {
    let (key, members) = payload.require()?;
    let added = state.kv.set_add(key, members).await?;
    Ok(Json(SetAddResponse {
        success: true,
        message: "Members added to set".to_string(),
        key: key.to_string(),
        added,
    }))
}

pub async fn set_members_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<SetMembersResponse>, AppError> {
    let members = state.kv.set_members(&key).await?;
    Ok(Json(SetMembersResponse {
        success: true,
        key,
        members,
    }))
}

pub async fn session_create_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionCreateRequest>,
) -> Result<Json<SessionCreateResponse>, AppError> {
    let (session_id, user_id) = payload.require()?;
    let ttl = payload.ttl.unwrap_or(DEFAULT_SESSION_TTL);

    let now = Utc::now().to_rfc3339();
    let mut session = serde_json::Map::new();
    session.insert("userId".to_string(), serde_json::Value::String(user_id.to_string()));
    session.insert("createdAt".to_string(), serde_json::Value::String(now.clone()));
    session.insert("lastAccessed".to_string(), serde_json::Value::String(now));
    if let Some(data) = &payload.data {
        session.extend(data.clone());
    }

    state
        .kv
        .set(
            &format!("{SESSION_PREFIX}{session_id}"),
            &serde_json::Value::Object(session),
            Some(ttl),
        )
        .await?;

    Ok(Json(SessionCreateResponse {
        success: true,
        message: "Session created successfully".to_string(),
        session_id: session_id.to_string(),
        ttl,
    }))
}

pub async fn session_get_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let key = format!("{SESSION_PREFIX}{session_id}");
    let Some(value) = state.kv.get(&key).await? else {
        return Err(AppError::NotFound("Session not found".to_string()));
    };

    let data = match value {
        StoredValue::Parsed(serde_json::Value::Object(mut session)) => {
            session.insert(
                "lastAccessed".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
            let refreshed = serde_json::Value::Object(session);
            state.kv.set(&key, &refreshed, None).await?;
            refreshed
        }
        StoredValue::Parsed(other) => other,
        StoredValue::Raw(raw) => serde_json::Value::String(raw),
    };

    Ok(Json(SessionResponse {
        success: true,
        session_id,
        data,
    }))
}

pub async fn session_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<KvDeleteResponse>, AppError> {
    let deleted = state
        .kv
        .delete(&format!("{SESSION_PREFIX}{session_id}"))
        .await?;
    Ok(Json(KvDeleteResponse {
        success: true,
        message: if deleted {
            "Session deleted successfully".to_string()
        } else {
            "Session not found".to_string()
        },
        deleted,
    }))
}

pub async fn cache_set_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetKeyRequest>,
) -> Result<Json<KvSetResponse>, AppError> {
    let (key, value) = payload.require()?;
    let ttl = payload.ttl.unwrap_or(DEFAULT_CACHE_TTL);
    state
        .kv
        .set(&format!("{CACHE_PREFIX}{key}"), value, Some(ttl))
        .await?;
    Ok(Json(KvSetResponse {
        success: true,
        message: "Cache set successfully".to_string(),
        key: key.to_string(),
        ttl: Some(ttl),
    }))
}

pub async fn cache_get_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CacheValueResponse>, AppError> {
    let value = state.kv.get(&format!("{CACHE_PREFIX}{key}")).await?;
    Ok(Json(CacheValueResponse {
        success: true,
        key,
        cached: value.is_some(),
        value,
    }))
}

pub async fn kv_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<KvStatsResponse>, AppError> {
    let stats = state.kv.stats().await?;
    Ok(Json(KvStatsResponse {
        success: true,
        stats,
    }))
}

// ---------------------------------------------------------------------------
// Document-store relay
// ---------------------------------------------------------------------------

pub async fn supabase_health_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<BackendHealth>) {
    backend_health("supabase-relay", state.documents.health_check().await)
}

pub async fn doc_query_handler(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<DocQueryParams>,
) -> Result<Json<DocRowsResponse>, AppError> {
    let spec = params.into_spec()?;
    let data = state.documents.query(&table, &spec).await?;
    Ok(Json(DocRowsResponse {
        success: true,
        data,
    }))
}

pub async fn doc_insert_handler(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Json(payload): Json<DocWriteRequest>,
) -> Result<Json<DocRowsResponse>, AppError> {
    let rows = payload.require()?;
    let data = state.documents.insert(&table, rows).await?;
    Ok(Json(DocRowsResponse {
        success: true,
        data,
    }))
}

pub async fn doc_update_handler(
    State(state): State<Arc<AppState>>,
    Path((table, id)): Path<(String, String)>,
    Json(payload): Json<DocWriteRequest>,
) -> Result<Json<DocRowsResponse>, AppError> {
    let patch = payload.require()?;
    let data = state.documents.update(&table, &id, patch).await?;
    Ok(Json(DocRowsResponse {
        success: true,
        data,
    }))
}

pub async fn doc_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((table, id)): Path<(String, String)>,
) -> Result<Json<DocDeleteResponse>, AppError> {
    state.documents.delete(&table, &id).await?;
    Ok(Json(DocDeleteResponse {
        success: true,
        message: "Record deleted successfully".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Error conversion
// ---------------------------------------------------------------------------

fn is_production() -> bool {
    std::env::var("APP_ENV").is_ok_and(|v| v == "production")
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            // The backend blamed the request itself (bad filter, unknown
            // column); surface it as the caller's error.
            AppError::DocStore(DocStoreError::Request { status, .. })
            | AppError::Table(TableError::Request { status, .. })
                if (400..500).contains(status) =>
            {
                StatusCode::BAD_REQUEST
            }
            AppError::Llm(LlmError::Timeout(_))
            | AppError::Kv(KvError::Timeout(_))
            | AppError::DocStore(DocStoreError::Timeout(_))
            | AppError::Table(TableError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Llm(LlmError::Connection(_))
            | AppError::Kv(KvError::Connection(_))
            | AppError::DocStore(DocStoreError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status.is_server_error() {
            error!(status = %status, error = %self, "Relay error");
            metrics::counter!("relay_errors_total").increment(1);
            if is_production() {
                "Internal server error".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationError;

    #[test]
    fn test_validation_error_maps_to_400() {
        let err = AppError::Validation(ValidationError::MissingField(
            "Key and value are required".to_string(),
        ));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_auth_errors_map_to_401_and_403() {
        let missing = AppError::Authentication("API key required".to_string());
        assert_eq!(missing.into_response().status(), StatusCode::UNAUTHORIZED);

        let invalid = AppError::Authorization("Invalid API key".to_string());
        assert_eq!(invalid.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_backend_request_error_passes_through_as_400() {
        let err = AppError::DocStore(DocStoreError::Request {
            status: 400,
            message: "bad filter".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        // A backend 5xx is not the caller's fault.
        let err = AppError::DocStore(DocStoreError::Request {
            status: 502,
            message: "upstream down".to_string(),
        });
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let err = AppError::Kv(KvError::Timeout("10s".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = AppError::NotFound("Session not found".to_string());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    // Production redaction is exercised in integration tests; APP_ENV
    // mutation is unsafe under the 2024 edition so it is not toggled here.
}
