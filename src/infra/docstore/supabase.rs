//! Supabase document-store adapter speaking the PostgREST dialect.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};

use crate::domain::{AppError, DocQuerySpec, DocStoreError, DocumentStore};

/// Configuration for the document-store adapter.
#[derive(Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub service_key: SecretString,
    pub timeout: Duration,
    /// Extra attempts for idempotent reads. Writes never retry.
    pub read_retries: u32,
    pub retry_delay: Duration,
}

impl SupabaseConfig {
    pub fn new(base_url: impl Into<String>, service_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            service_key,
            timeout: Duration::from_secs(15),
            read_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// PostgREST-backed [`DocumentStore`].
pub struct SupabaseDocumentStore {
    http: Client,
    config: SupabaseConfig,
}

impl SupabaseDocumentStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::DocStore(DocStoreError::Connection(e.to_string())))?;
        info!(base_url = %config.base_url, "Created document-store client");
        Ok(Self { http, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let key = self.config.service_key.expose_secret();
        self.http
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
    }

    /// PostgREST encodes equality filters as `column=eq.value` query pairs.
    fn query_pairs(spec: &DocQuerySpec) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        pairs.push((
            "select".to_string(),
            spec.select.clone().unwrap_or_else(|| "*".to_string()),
        ));
        for (column, value) in &spec.eq {
            let literal = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push((column.clone(), format!("eq.{literal}")));
        }
        if let Some((column, ascending)) = &spec.order {
            let direction = if *ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{column}.{direction}")));
        }
        if let Some(limit) = spec.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// Convert a non-success response into the typed error, preserving the
    /// backend's own message and status.
    async fn response_error(response: Response) -> AppError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(text);
        AppError::DocStore(DocStoreError::Request { status, message })
    }

    async fn rows_from(response: Response) -> Result<Vec<serde_json::Value>, AppError> {
        if !response.status().is_success() {
            return Err(Self::response_error(response).await);
        }
        let rows: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::DocStore(e.into()))?;
        match rows {
            serde_json::Value::Array(rows) => Ok(rows),
            single => Ok(vec![single]),
        }
    }

    async fn run_query(
        &self,
        table: &str,
        spec: &DocQuerySpec,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let response = self
            .request(Method::GET, &self.table_url(table))
            .query(&Self::query_pairs(spec))
            .send()
            .await
            .map_err(|e| AppError::DocStore(e.into()))?;
        Self::rows_from(response).await
    }
}

#[async_trait]
impl DocumentStore for SupabaseDocumentStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/rest/v1/", self.config.base_url.trim_end_matches('/'));
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| AppError::DocStore(e.into()))?;
        if !response.status().is_success() {
            return Err(Self::response_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self, spec))]
    async fn query(
        &self,
        table: &str,
        spec: &DocQuerySpec,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let mut last_error = None;
        for attempt in 0..=self.config.read_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.run_query(table, spec).await {
                Ok(rows) => return Ok(rows),
                // Request-shaped failures are the caller's mistake; retrying
                // cannot change the outcome.
                Err(e @ AppError::DocStore(DocStoreError::Request { .. })) => return Err(e),
                Err(e) => {
                    warn!(attempt = attempt, table = %table, error = ?e, "Query failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::DocStore(DocStoreError::Connection("Unknown error".to_string()))
        }))
    }

    #[instrument(skip(self, rows))]
    async fn insert(
        &self,
        table: &str,
        rows: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let response = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await
            .map_err(|e| AppError::DocStore(e.into()))?;
        Self::rows_from(response).await
    }

    #[instrument(skip(self, patch))]
    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let response = self
            .request(Method::PATCH, &self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(|e| AppError::DocStore(e.into()))?;
        Self::rows_from(response).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError> {
        let response = self
            .request(Method::DELETE, &self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|e| AppError::DocStore(e.into()))?;
        if !response.status().is_success() {
            return Err(Self::response_error(response).await);
        }
        Ok(())
    }
}
