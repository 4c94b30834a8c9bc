use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ValidationError;

/// A value read back from the key-value backend.
///
/// Values are serialized to JSON before storage. On read the stored bytes are
/// parsed best-effort: anything that is not valid JSON comes back as
/// `Raw(String)` instead of an error, so a corrupted entry can never turn a
/// read into a 500.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StoredValue {
    Parsed(serde_json::Value),
    Raw(String),
}

impl StoredValue {
    /// Decode a wire string from the backend.
    #[must_use]
    pub fn from_wire(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => StoredValue::Parsed(value),
            Err(_) => StoredValue::Raw(raw),
        }
    }
}

/// Failure envelope. Every non-2xx response carries this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Failure envelope for the unknown-route fallback.
#[derive(Debug, Clone, Serialize)]
pub struct NotFoundBody {
    pub success: bool,
    pub error: String,
    pub path: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

/// Failure envelope for rate-limited requests.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitBody {
    pub success: bool,
    pub error: String,
    pub retry_after: u64,
}

// ---------------------------------------------------------------------------
// Key-value relay payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SetKeyRequest {
    pub key: Option<String>,
    pub value: Option<serde_json::Value>,
    pub ttl: Option<u64>,
}

impl SetKeyRequest {
    /// Both `key` and `value` must be present before any backend call.
    pub fn require(&self) -> Result<(&str, &serde_json::Value), ValidationError> {
        match (self.key.as_deref(), self.value.as_ref()) {
            (Some(key), Some(value)) if !key.is_empty() => Ok((key, value)),
            _ => Err(ValidationError::MissingField(
                "Key and value are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashSetRequest {
    pub key: Option<String>,
    pub field: Option<String>,
    pub value: Option<serde_json::Value>,
}

impl HashSetRequest {
    pub fn require(&self) -> Result<(&str, &str, &serde_json::Value), ValidationError> {
        match (self.key.as_deref(), self.field.as_deref(), self.value.as_ref()) {
            (Some(key), Some(field), Some(value)) if !key.is_empty() && !field.is_empty() => {
                Ok((key, field, value))
            }
            _ => Err(ValidationError::MissingField(
                "Key, field, and value are required".to_string(),
            )),
        }
    }
}

/// Which end of a list a push lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushDirection {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPushRequest {
    pub key: Option<String>,
    pub values: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub direction: PushDirection,
}

impl ListPushRequest {
    pub fn require(&self) -> Result<(&str, &[serde_json::Value]), ValidationError> {
        match (self.key.as_deref(), self.values.as_deref()) {
            (Some(key), Some(values)) if !key.is_empty() => Ok((key, values)),
            _ => Err(ValidationError::MissingField(
                "Key and values array are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetAddRequest {
    pub key: Option<String>,
    pub members: Option<Vec<serde_json::Value>>,
}

impl SetAddRequest {
    pub fn require(&self) -> Result<(&str, &[serde_json::Value]), ValidationError> {
        match (self.key.as_deref(), self.members.as_deref()) {
            (Some(key), Some(members)) if !key.is_empty() => Ok((key, members)),
            _ => Err(ValidationError::MissingField(
                "Key and members array are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateRequest {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub ttl: Option<u64>,
}

impl SessionCreateRequest {
    pub fn require(&self) -> Result<(&str, &str), ValidationError> {
        match (self.session_id.as_deref(), self.user_id.as_deref()) {
            (Some(sid), Some(uid)) if !sid.is_empty() && !uid.is_empty() => Ok((sid, uid)),
            _ => Err(ValidationError::MissingField(
                "Session ID and user ID are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListRangeParams {
    #[serde(default)]
    pub start: isize,
    #[serde(default = "default_range_stop")]
    pub stop: isize,
}

fn default_range_stop() -> isize {
    -1
}

#[derive(Debug, Clone, Serialize)]
pub struct KvValueResponse {
    pub success: bool,
    pub key: String,
    pub value: Option<StoredValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KvSetResponse {
    pub success: bool,
    pub message: String,
    pub key: String,
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KvDeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashSetResponse {
    pub success: bool,
    pub message: String,
    pub key: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashFieldResponse {
    pub success: bool,
    pub key: String,
    pub field: String,
    pub value: Option<StoredValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashAllResponse {
    pub success: bool,
    pub key: String,
    pub hash: HashMap<String, StoredValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPushResponse {
    pub success: bool,
    pub message: String,
    pub key: String,
    pub length: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRangeResponse {
    pub success: bool,
    pub key: String,
    pub values: Vec<StoredValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetAddResponse {
    pub success: bool,
    pub message: String,
    pub key: String,
    pub added: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetMembersResponse {
    pub success: bool,
    pub key: String,
    pub members: Vec<StoredValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub ttl: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub session_id: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheValueResponse {
    pub success: bool,
    pub key: String,
    pub value: Option<StoredValue>,
    pub cached: bool,
}

/// Backend statistics snapshot (DBSIZE plus parsed INFO lines).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KvStats {
    pub db_size: i64,
    pub info: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KvStatsResponse {
    pub success: bool,
    pub stats: KvStats,
}

// ---------------------------------------------------------------------------
// LLM relay payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvokeRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1, max = 8192))]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchInvokeRequest {
    pub prompts: Option<Vec<String>>,
}

impl BatchInvokeRequest {
    pub fn require(&self) -> Result<&[String], ValidationError> {
        self.prompts.as_deref().ok_or_else(|| {
            ValidationError::MissingField("prompts must be an array".to_string())
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvokeResponse {
    pub success: bool,
    pub response: serde_json::Value,
}

/// One entry of a batch invocation. Entries fail independently; the batch
/// response is `success: true` whenever the fan-out itself completed.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub success: bool,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchInvokeResponse {
    pub success: bool,
    pub results: Vec<BatchItem>,
}

// ---------------------------------------------------------------------------
// Document-store relay payloads
// ---------------------------------------------------------------------------

/// Raw query parameters accepted on `GET /api/supabase/data/{table}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocQueryParams {
    pub select: Option<String>,
    /// JSON object of column → value equality filters.
    pub filter: Option<String>,
    /// `column:asc` or `column:desc`.
    pub order: Option<String>,
    pub limit: Option<u32>,
}

/// A validated, structured query handed to the document-store adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocQuerySpec {
    pub select: Option<String>,
    pub eq: Vec<(String, serde_json::Value)>,
    /// Column and ascending flag.
    pub order: Option<(String, bool)>,
    pub limit: Option<u32>,
}

impl DocQueryParams {
    /// Validate and structure the raw parameters. A filter that is not a JSON
    /// object is the caller's mistake and fails fast before any network call.
    pub fn into_spec(self) -> Result<DocQuerySpec, ValidationError> {
        let eq = match self.filter.as_deref() {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
                _ => {
                    return Err(ValidationError::InvalidField {
                        field: "filter".to_string(),
                        message: "must be a JSON object of column/value pairs".to_string(),
                    });
                }
            },
        };

        let order = self.order.as_deref().map(|raw| {
            let (column, direction) = raw.split_once(':').unwrap_or((raw, "asc"));
            (column.to_string(), direction != "desc")
        });

        Ok(DocQuerySpec {
            select: self.select,
            eq,
            order,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocWriteRequest {
    pub data: Option<serde_json::Value>,
}

impl DocWriteRequest {
    pub fn require(&self) -> Result<&serde_json::Value, ValidationError> {
        self.data
            .as_ref()
            .ok_or_else(|| ValidationError::MissingField("data is required".to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocRowsResponse {
    pub success: bool,
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocDeleteResponse {
    pub success: bool,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Health check status for services.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesHealth {
    pub bedrock: HealthStatus,
    pub supabase: HealthStatus,
    pub redis: HealthStatus,
}

/// Aggregate health for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub services: ServicesHealth,
}

impl HealthResponse {
    #[must_use]
    pub fn new(environment: String, services: ServicesHealth) -> Self {
        let status = if services.bedrock == HealthStatus::Healthy
            && services.supabase == HealthStatus::Healthy
            && services.redis == HealthStatus::Healthy
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
            services,
        }
    }
}

/// Per-backend health for `GET /api/<backend>/health`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub status: HealthStatus,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Table client types (Airtable-shaped)
// ---------------------------------------------------------------------------

/// A record in the table backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRecord {
    pub id: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(
        rename = "createdTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<String>,
}

/// One page of records plus the opaque continuation offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPage {
    pub records: Vec<TableRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Options for a record listing. Serialized form doubles as the cache key
/// component, so field order here is part of the cache contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListRecordsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by_formula: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// A single update in a bulk patch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPatch {
    pub id: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_value_parses_json() {
        let value = StoredValue::from_wire("{\"a\":1}".to_string());
        assert_eq!(value, StoredValue::Parsed(json!({"a": 1})));
    }

    #[test]
    fn test_stored_value_falls_back_to_raw() {
        let value = StoredValue::from_wire("not-json{".to_string());
        assert_eq!(value, StoredValue::Raw("not-json{".to_string()));
    }

    #[test]
    fn test_stored_value_serializes_transparently() {
        let parsed = StoredValue::Parsed(json!({"a": 1}));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "{\"a\":1}");

        let raw = StoredValue::Raw("plain".to_string());
        assert_eq!(serde_json::to_string(&raw).unwrap(), "\"plain\"");
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::new("boom");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["error"], json!("boom"));
    }

    #[test]
    fn test_set_key_request_requires_key_and_value() {
        let ok = SetKeyRequest {
            key: Some("k1".to_string()),
            value: Some(json!({"a": 1})),
            ttl: Some(60),
        };
        assert!(ok.require().is_ok());

        let missing_value = SetKeyRequest {
            key: Some("k1".to_string()),
            value: None,
            ttl: None,
        };
        let err = missing_value.require().unwrap_err();
        assert_eq!(err.to_string(), "Key and value are required");

        let empty_key = SetKeyRequest {
            key: Some(String::new()),
            value: Some(json!(1)),
            ttl: None,
        };
        assert!(empty_key.require().is_err());
    }

    #[test]
    fn test_push_direction_default_is_right() {
        let req: ListPushRequest =
            serde_json::from_value(json!({"key": "k", "values": [1]})).unwrap();
        assert_eq!(req.direction, PushDirection::Right);

        let req: ListPushRequest =
            serde_json::from_value(json!({"key": "k", "values": [1], "direction": "left"}))
                .unwrap();
        assert_eq!(req.direction, PushDirection::Left);
    }

    #[test]
    fn test_invoke_request_defaults() {
        let req: InvokeRequest = serde_json::from_value(json!({"prompt": "hi"})).unwrap();
        assert_eq!(req.max_tokens, 1000);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invoke_request_rejects_empty_prompt() {
        use validator::Validate;

        let req: InvokeRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_batch_request_requires_array() {
        let req: BatchInvokeRequest = serde_json::from_value(json!({})).unwrap();
        let err = req.require().unwrap_err();
        assert_eq!(err.to_string(), "prompts must be an array");
    }

    #[test]
    fn test_doc_query_params_into_spec() {
        let params = DocQueryParams {
            select: Some("id,name".to_string()),
            filter: Some("{\"status\":\"active\"}".to_string()),
            order: Some("created_at:desc".to_string()),
            limit: Some(10),
        };
        let spec = params.into_spec().unwrap();
        assert_eq!(spec.eq, vec![("status".to_string(), json!("active"))]);
        assert_eq!(spec.order, Some(("created_at".to_string(), false)));
        assert_eq!(spec.limit, Some(10));
    }

    #[test]
    fn test_doc_query_params_rejects_non_object_filter() {
        let params = DocQueryParams {
            filter: Some("[1,2]".to_string()),
            ..Default::default()
        };
        assert!(params.into_spec().is_err());
    }

    #[test]
    fn test_doc_query_order_defaults_ascending() {
        let params = DocQueryParams {
            order: Some("name".to_string()),
            ..Default::default()
        };
        let spec = params.into_spec().unwrap();
        assert_eq!(spec.order, Some(("name".to_string(), true)));
    }

    #[test]
    fn test_health_response_aggregates() {
        let all_up = HealthResponse::new(
            "test".to_string(),
            ServicesHealth {
                bedrock: HealthStatus::Healthy,
                supabase: HealthStatus::Healthy,
                redis: HealthStatus::Healthy,
            },
        );
        assert_eq!(all_up.status, HealthStatus::Healthy);

        let one_down = HealthResponse::new(
            "test".to_string(),
            ServicesHealth {
                bedrock: HealthStatus::Healthy,
                supabase: HealthStatus::Unhealthy,
                redis: HealthStatus::Healthy,
            },
        );
        assert_eq!(one_down.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_record_page_round_trip() {
        let page = RecordPage {
            records: vec![TableRecord {
                id: "rec123".to_string(),
                fields: serde_json::from_value(json!({"Name": "Acme"})).unwrap(),
                created_time: Some("2024-01-01T00:00:00.000Z".to_string()),
            }],
            offset: Some("itrNext".to_string()),
        };

        let json = serde_json::to_string(&page).unwrap();
        let back: RecordPage = serde_json::from_str(&json).unwrap();
        assert_eq!(page, back);
    }

    #[test]
    fn test_list_options_serialization_is_stable() {
        let options = ListRecordsOptions {
            view: Some("Grid view".to_string()),
            sort: vec![SortSpec {
                field: "Name".to_string(),
                direction: SortDirection::Asc,
            }],
            ..Default::default()
        };

        let a = serde_json::to_string(&options).unwrap();
        let b = serde_json::to_string(&options.clone()).unwrap();
        assert_eq!(a, b);
    }
}
