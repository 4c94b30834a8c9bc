//! Typed client for the table backend.
//!
//! One method per domain operation, delegating to an injected
//! [`TableTransport`]. Reads are decorated with the TTL cache; writes
//! invalidate the affected table's cached reads before returning, so a read
//! after a write never serves the pre-write snapshot. Every failure is
//! reported through the [`ErrorSink`] and rethrown.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::domain::{
    AppError, ErrorSink, ListRecordsOptions, RecordPage, RecordPatch, TableError, TableRecord,
    TableTransport, TracingErrorSink,
};

use super::cache::{CacheConfig, TtlCache};

pub struct TableClient {
    transport: Arc<dyn TableTransport>,
    cache: TtlCache,
    error_sink: Arc<dyn ErrorSink>,
    base_id: String,
}

impl TableClient {
    #[must_use]
    pub fn new(transport: Arc<dyn TableTransport>, base_id: impl Into<String>) -> Self {
        Self {
            transport,
            cache: TtlCache::default(),
            error_sink: Arc::new(TracingErrorSink),
            base_id: base_id.into(),
        }
    }

    #[must_use]
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = TtlCache::new(config);
        self
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    /// Cache statistics, mostly useful in tests and diagnostics.
    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    fn digest(input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn table_prefix(&self, table: &str) -> String {
        format!("{}:{}:", self.base_id, table)
    }

    fn read_key(&self, table: &str, operation: &str, args: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.base_id,
            table,
            operation,
            Self::digest(args)
        )
    }

    /// Serve from cache when fresh; otherwise fetch, store, and return.
    async fn cached_read<T>(
        &self,
        key: String,
        context: &str,
        fetch: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(hit) = self.cache.get(&key) {
            if let Ok(value) = serde_json::from_value(hit) {
                return Ok(value);
            }
            // Entry shape drifted across a version change; fetch fresh.
        }

        match fetch.await {
            Ok(value) => {
                if let Ok(serialized) = serde_json::to_value(&value) {
                    self.cache.put(key, serialized);
                }
                Ok(value)
            }
            Err(e) => {
                self.error_sink.report(context, &e);
                Err(e)
            }
        }
    }

    /// Run a write, then drop the table's cached reads before returning.
    async fn write_through<T>(
        &self,
        table: &str,
        context: &str,
        operation: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match operation.await {
            Ok(value) => {
                self.cache.invalidate_prefix(&self.table_prefix(table));
                Ok(value)
            }
            Err(e) => {
                self.error_sink.report(context, &e);
                Err(e)
            }
        }
    }

    // -- Record reads -------------------------------------------------------

    pub async fn list_records(
        &self,
        table: &str,
        options: &ListRecordsOptions,
    ) -> Result<RecordPage, AppError> {
        let args = serde_json::to_string(options).unwrap_or_default();
        let key = self.read_key(table, "list", &args);
        self.cached_read(
            key,
            &format!("Failed to list records for table: {table}"),
            self.transport.list_records(&self.base_id, table, options),
        )
        .await
    }

    pub async fn get_record(&self, table: &str, record_id: &str) -> Result<TableRecord, AppError> {
        let key = self.read_key(table, "get", record_id);
        self.cached_read(
            key,
            &format!("Failed to get record: {record_id}"),
            self.transport.get_record(&self.base_id, table, record_id),
        )
        .await
    }

    /// Raw schema document for the base. Base-level, so table writes leave it
    /// cached.
    pub async fn get_schema(&self) -> Result<serde_json::Value, AppError> {
        let key = format!("{}:_meta:schema", self.base_id);
        self.cached_read(
            key,
            "Failed to get base schema",
            self.transport.get_schema(&self.base_id),
        )
        .await
    }

    // -- Record writes ------------------------------------------------------

    pub async fn create_record(
        &self,
        table: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<TableRecord, AppError> {
        let created = self
            .write_through(
                table,
                "Failed to create record",
                self.transport
                    .create_records(&self.base_id, table, std::slice::from_ref(&fields)),
            )
            .await?;
        created.into_iter().next().ok_or_else(|| {
            AppError::Table(TableError::Decode("empty create response".to_string()))
        })
    }

    pub async fn bulk_create(
        &self,
        table: &str,
        records: Vec<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Vec<TableRecord>, AppError> {
        self.write_through(
            table,
            "Failed to bulk create records",
            self.transport.create_records(&self.base_id, table, &records),
        )
        .await
    }

    pub async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<TableRecord, AppError> {
        let patch = RecordPatch {
            id: record_id.to_string(),
            fields,
        };
        let updated = self
            .write_through(
                table,
                &format!("Failed to update record: {record_id}"),
                self.transport
                    .update_records(&self.base_id, table, std::slice::from_ref(&patch)),
            )
            .await?;
        updated.into_iter().next().ok_or_else(|| {
            AppError::Table(TableError::Decode("empty update response".to_string()))
        })
    }

    pub async fn bulk_update(
        &self,
        table: &str,
        patches: Vec<RecordPatch>,
    ) -> Result<Vec<TableRecord>, AppError> {
        self.write_through(
            table,
            "Failed to bulk update records",
            self.transport.update_records(&self.base_id, table, &patches),
        )
        .await
    }

    /// Returns whether the record existed.
    pub async fn delete_record(&self, table: &str, record_id: &str) -> Result<bool, AppError> {
        let deleted = self
            .write_through(
                table,
                &format!("Failed to delete record: {record_id}"),
                self.transport.delete_records(
                    &self.base_id,
                    table,
                    std::slice::from_ref(&record_id.to_string()),
                ),
            )
            .await?;
        Ok(deleted.iter().any(|id| id == record_id))
    }

    pub async fn bulk_delete(
        &self,
        table: &str,
        record_ids: Vec<String>,
    ) -> Result<Vec<String>, AppError> {
        self.write_through(
            table,
            "Failed to bulk delete records",
            self.transport.delete_records(&self.base_id, table, &record_ids),
        )
        .await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
