//! Domain traits defining contracts for the relayed backends.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::AppError;
use super::types::{
    DocQuerySpec, KvStats, ListRecordsOptions, PushDirection, RecordPage, RecordPatch,
    StoredValue, TableRecord,
};

/// LLM inference backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Check backend reachability.
    async fn health_check(&self) -> Result<(), AppError>;

    /// Run a single completion and return the model's raw JSON response.
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<serde_json::Value, AppError>;
}

/// Key-value backend. Values are JSON-serialized on write; reads decode
/// best-effort into [`StoredValue`].
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn get(&self, key: &str) -> Result<Option<StoredValue>, AppError>;

    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Option<u64>,
    ) -> Result<(), AppError>;

    /// Returns false when the key did not exist. Deleting an absent key is
    /// not an error.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<(), AppError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<StoredValue>, AppError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, StoredValue>, AppError>;

    /// Push values onto a list and return the new list length.
    async fn list_push(
        &self,
        key: &str,
        values: &[serde_json::Value],
        direction: PushDirection,
    ) -> Result<i64, AppError>;

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<StoredValue>, AppError>;

    /// Add members to a set and return how many were newly added.
    async fn set_add(
        &self,
        key: &str,
        members: &[serde_json::Value],
    ) -> Result<i64, AppError>;

    async fn set_members(&self, key: &str) -> Result<Vec<StoredValue>, AppError>;

    async fn stats(&self) -> Result<KvStats, AppError>;
}

/// Document-store backend (table/row shaped).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn query(
        &self,
        table: &str,
        spec: &DocQuerySpec,
    ) -> Result<Vec<serde_json::Value>, AppError>;

    /// Insert one row or an array of rows; returns the inserted rows.
    async fn insert(
        &self,
        table: &str,
        rows: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError>;

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError>;
}

/// Wire transport behind the typed table client. The HTTP implementation
/// speaks the table service's REST dialect; tests substitute a recording
/// mock.
#[async_trait]
pub trait TableTransport: Send + Sync {
    async fn list_records(
        &self,
        base: &str,
        table: &str,
        options: &ListRecordsOptions,
    ) -> Result<RecordPage, AppError>;

    async fn get_record(
        &self,
        base: &str,
        table: &str,
        record_id: &str,
    ) -> Result<TableRecord, AppError>;

    async fn create_records(
        &self,
        base: &str,
        table: &str,
        fields: &[serde_json::Map<String, serde_json::Value>],
    ) -> Result<Vec<TableRecord>, AppError>;

    async fn update_records(
        &self,
        base: &str,
        table: &str,
        patches: &[RecordPatch],
    ) -> Result<Vec<TableRecord>, AppError>;

    /// Returns the ids actually deleted.
    async fn delete_records(
        &self,
        base: &str,
        table: &str,
        record_ids: &[String],
    ) -> Result<Vec<String>, AppError>;

    /// Raw schema document for a base. Passed through opaque.
    async fn get_schema(&self, base: &str) -> Result<serde_json::Value, AppError>;
}

/// Failure reporting hook for the table client. The client logs through this
/// and rethrows; it never hides a failure from the caller.
pub trait ErrorSink: Send + Sync {
    fn report(&self, context: &str, error: &AppError);
}

/// Default sink: structured log at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, context: &str, error: &AppError) {
        tracing::error!(error = %error, "{context}");
    }
}
