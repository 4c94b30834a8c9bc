//! Mock implementations for testing.
//!
//! These mocks provide in-memory implementations of the domain traits that
//! can be configured to simulate success, failure, and edge cases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    AppError, DocQuerySpec, DocStoreError, DocumentStore, ErrorSink, KvError, KvStats,
    KvStore, ListRecordsOptions, LlmClient, LlmError, PushDirection, RecordPage,
    RecordPatch, StoredValue, TableError, TableRecord, TableTransport, ValidationError,
};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, operations will fail.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
    /// Simulated latency in milliseconds.
    pub latency_ms: Option<u64>,
}

impl MockConfig {
    /// Creates a config that always succeeds.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a config that always fails.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
            latency_ms: None,
        }
    }

    /// Adds simulated latency.
    #[must_use]
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    async fn simulate(&self) {
        if let Some(ms) = self.latency_ms {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
    }

    fn message_or(&self, default: &str) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

// ---------------------------------------------------------------------------
// LLM mock
// ---------------------------------------------------------------------------

/// Mock LLM client. Echoes prompts back in an Anthropic-shaped response and
/// rejects empty prompts, like the real adapter.
pub struct MockLlmClient {
    prompts: Mutex<Vec<String>>,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockLlmClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Number of invoke calls that reached the mock.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// All prompts submitted so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Llm(LlmError::Connection(
                "Mock LLM unhealthy".to_string(),
            )));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        _temperature: f32,
    ) -> Result<serde_json::Value, AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate().await;

        if self.config.should_fail {
            return Err(AppError::Llm(LlmError::Invocation(
                self.config.message_or("Mock LLM error"),
            )));
        }
        if prompt.is_empty() {
            return Err(AppError::Validation(ValidationError::MissingField(
                "prompt must not be empty".to_string(),
            )));
        }

        self.prompts.lock().unwrap().push(prompt.to_string());

        Ok(serde_json::json!({
            "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
            "model": "mock-model",
            "content": [{"type": "text", "text": format!("echo: {prompt}")}],
            "usage": {"input_tokens": prompt.len(), "output_tokens": max_tokens.min(16)}
        }))
    }
}

// ---------------------------------------------------------------------------
// Key-value mock
// ---------------------------------------------------------------------------

/// Mock key-value store over in-memory maps. Stores the serialized wire form
/// so reads exercise the same parse-or-raw fallback as the real adapter.
pub struct MockKvStore {
    strings: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    lists: Mutex<HashMap<String, Vec<String>>>,
    sets: Mutex<HashMap<String, Vec<String>>>,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            strings: Mutex::new(HashMap::new()),
            hashes: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Plant a raw wire value, bypassing JSON serialization. Used to simulate
    /// corrupted entries.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.strings.lock().unwrap().insert(key.into(), raw.into());
    }

    async fn touch(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate().await;
        if self.config.should_fail {
            return Err(AppError::Kv(KvError::Command(
                self.config.message_or("Mock KV error"),
            )));
        }
        Ok(())
    }
}

impl Default for MockKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MockKvStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Kv(KvError::Connection(
                "Mock KV unhealthy".to_string(),
            )));
        }
        self.touch().await
    }

    async fn get(&self, key: &str) -> Result<Option<StoredValue>, AppError> {
        self.touch().await?;
        let strings = self.strings.lock().unwrap();
        Ok(strings.get(key).cloned().map(StoredValue::from_wire))
    }

    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        _ttl: Option<u64>,
    ) -> Result<(), AppError> {
        self.touch().await?;
        let serialized = serde_json::to_string(value)?;
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), serialized);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        self.touch().await?;
        Ok(self.strings.lock().unwrap().remove(key).is_some())
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<(), AppError> {
        self.touch().await?;
        let serialized = serde_json::to_string(value)?;
        self.hashes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), serialized);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<StoredValue>, AppError> {
        self.touch().await?;
        let hashes = self.hashes.lock().unwrap();
        Ok(hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned()
            .map(StoredValue::from_wire))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, StoredValue>, AppError> {
        self.touch().await?;
        let hashes = self.hashes.lock().unwrap();
        Ok(hashes
            .get(key)
            .map(|h| {
                h.iter()
                    .map(|(f, v)| (f.clone(), StoredValue::from_wire(v.clone())))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_push(
        &self,
        key: &str,
        values: &[serde_json::Value],
        direction: PushDirection,
    ) -> Result<i64, AppError> {
        self.touch().await?;
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        for value in values {
            let serialized = serde_json::to_string(value)?;
            match direction {
                PushDirection::Left => list.insert(0, serialized),
                PushDirection::Right => list.push(serialized),
            }
        }
        Ok(list.len() as i64)
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<StoredValue>, AppError> {
        self.touch().await?;
        let lists = self.lists.lock().unwrap();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };

        let len = list.len() as isize;
        let clamp = |i: isize| -> usize {
            let resolved = if i < 0 { len + i } else { i };
            resolved.clamp(0, len) as usize
        };
        let start = clamp(start);
        let stop = (clamp(stop) + 1).min(list.len());
        if start >= stop {
            return Ok(Vec::new());
        }

        Ok(list[start..stop]
            .iter()
            .cloned()
            .map(StoredValue::from_wire)
            .collect())
    }

    async fn set_add(
        &self,
        key: &str,
        members: &[serde_json::Value],
    ) -> Result<i64, AppError> {
        self.touch().await?;
        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(key.to_string()).or_default();
        let mut added = 0;
        for member in members {
            let serialized = serde_json::to_string(member)?;
            if !set.contains(&serialized) {
                set.push(serialized);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<StoredValue>, AppError> {
        self.touch().await?;
        let sets = self.sets.lock().unwrap();
        Ok(sets
            .get(key)
            .map(|s| s.iter().cloned().map(StoredValue::from_wire).collect())
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<KvStats, AppError> {
        self.touch().await?;
        let db_size = self.strings.lock().unwrap().len() as i64;
        let mut info = HashMap::new();
        info.insert("redis_version".to_string(), "mock".to_string());
        Ok(KvStats { db_size, info })
    }
}

// ---------------------------------------------------------------------------
// Document-store mock
// ---------------------------------------------------------------------------

/// Mock document store. Rows live in per-table vectors; equality filters and
/// limits are applied the way the real backend would.
pub struct MockDocumentStore {
    tables: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    async fn touch(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate().await;
        if self.config.should_fail {
            return Err(AppError::DocStore(DocStoreError::Request {
                status: 400,
                message: self.config.message_or("Mock document-store error"),
            }));
        }
        Ok(())
    }
}

impl Default for MockDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::DocStore(DocStoreError::Connection(
                "Mock document store unhealthy".to_string(),
            )));
        }
        self.touch().await
    }

    async fn query(
        &self,
        table: &str,
        spec: &DocQuerySpec,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        self.touch().await?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<serde_json::Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        spec.eq
                            .iter()
                            .all(|(column, value)| row.get(column) == Some(value))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = spec.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(
        &self,
        table: &str,
        rows: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        self.touch().await?;
        let incoming: Vec<serde_json::Value> = match rows {
            serde_json::Value::Array(list) => list.clone(),
            single => vec![single.clone()],
        };

        let mut tables = self.tables.lock().unwrap();
        let stored = tables.entry(table.to_string()).or_default();
        let mut inserted = Vec::new();
        for mut row in incoming {
            if let Some(obj) = row.as_object_mut() {
                obj.entry("id".to_string()).or_insert_with(|| {
                    serde_json::Value::String(uuid::Uuid::new_v4().to_string())
                });
            }
            stored.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        self.touch().await?;
        let mut tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if row.get("id").and_then(|v| v.as_str()) == Some(id) {
                if let (Some(target), Some(source)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in source {
                        target.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError> {
        self.touch().await?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| row.get("id").and_then(|v| v.as_str()) != Some(id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Table transport mock
// ---------------------------------------------------------------------------

/// Recording mock for the table transport, with per-operation call counters
/// so caching behavior can be asserted precisely.
pub struct MockTableTransport {
    tables: Mutex<HashMap<String, Vec<TableRecord>>>,
    config: MockConfig,
    list_calls: AtomicU64,
    schema_calls: AtomicU64,
    call_count: AtomicU64,
}

impl MockTableTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            config,
            list_calls: AtomicU64::new(0),
            schema_calls: AtomicU64::new(0),
            call_count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn schema_calls(&self) -> u64 {
        self.schema_calls.load(Ordering::Relaxed)
    }

    async fn touch(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate().await;
        if self.config.should_fail {
            return Err(AppError::Table(TableError::Http(
                self.config.message_or("Mock table transport error"),
            )));
        }
        Ok(())
    }

    fn new_record(fields: serde_json::Map<String, serde_json::Value>) -> TableRecord {
        TableRecord {
            id: format!("rec{}", uuid::Uuid::new_v4().simple()),
            fields,
            created_time: Some(Utc::now().to_rfc3339()),
        }
    }
}

impl Default for MockTableTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableTransport for MockTableTransport {
    async fn list_records(
        &self,
        _base: &str,
        table: &str,
        options: &ListRecordsOptions,
    ) -> Result<RecordPage, AppError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.touch().await?;
        let tables = self.tables.lock().unwrap();
        let mut records = tables.get(table).cloned().unwrap_or_default();
        if let Some(size) = options.page_size {
            records.truncate(size as usize);
        }
        Ok(RecordPage {
            records,
            offset: None,
        })
    }

    async fn get_record(
        &self,
        _base: &str,
        table: &str,
        record_id: &str,
    ) -> Result<TableRecord, AppError> {
        self.touch().await?;
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .and_then(|records| records.iter().find(|r| r.id == record_id))
            .cloned()
            .ok_or_else(|| {
                AppError::Table(TableError::Request {
                    status: 404,
                    message: format!("Record {record_id} not found"),
                })
            })
    }

    async fn create_records(
        &self,
        _base: &str,
        table: &str,
        fields: &[serde_json::Map<String, serde_json::Value>],
    ) -> Result<Vec<TableRecord>, AppError> {
        self.touch().await?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.entry(table.to_string()).or_default();
        let created: Vec<TableRecord> = fields
            .iter()
            .cloned()
            .map(Self::new_record)
            .collect();
        stored.extend(created.clone());
        Ok(created)
    }

    async fn update_records(
        &self,
        _base: &str,
        table: &str,
        patches: &[RecordPatch],
    ) -> Result<Vec<TableRecord>, AppError> {
        self.touch().await?;
        let mut tables = self.tables.lock().unwrap();
        let Some(records) = tables.get_mut(table) else {
            return Err(AppError::Table(TableError::Request {
                status: 404,
                message: format!("Table {table} not found"),
            }));
        };

        let mut updated = Vec::new();
        for patch in patches {
            let Some(record) = records.iter_mut().find(|r| r.id == patch.id) else {
                return Err(AppError::Table(TableError::Request {
                    status: 404,
                    message: format!("Record {} not found", patch.id),
                }));
            };
            for (k, v) in &patch.fields {
                record.fields.insert(k.clone(), v.clone());
            }
            updated.push(record.clone());
        }
        Ok(updated)
    }

    async fn delete_records(
        &self,
        _base: &str,
        table: &str,
        record_ids: &[String],
    ) -> Result<Vec<String>, AppError> {
        self.touch().await?;
        let mut tables = self.tables.lock().unwrap();
        let Some(records) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut deleted = Vec::new();
        for id in record_ids {
            let before = records.len();
            records.retain(|r| &r.id != id);
            if records.len() < before {
                deleted.push(id.clone());
            }
        }
        Ok(deleted)
    }

    async fn get_schema(&self, base: &str) -> Result<serde_json::Value, AppError> {
        self.schema_calls.fetch_add(1, Ordering::Relaxed);
        self.touch().await?;
        let tables = self.tables.lock().unwrap();
        let names: Vec<&String> = tables.keys().collect();
        Ok(serde_json::json!({ "base": base, "tables": names }))
    }
}

// ---------------------------------------------------------------------------
// Error sink spy
// ---------------------------------------------------------------------------

/// Error sink that records every report.
pub struct CountingErrorSink {
    contexts: Mutex<Vec<String>>,
}

impl CountingErrorSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn reports(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn last_context(&self) -> Option<String> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

impl Default for CountingErrorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorSink for CountingErrorSink {
    fn report(&self, context: &str, _error: &AppError) {
        self.contexts.lock().unwrap().push(context.to_string());
    }
}
