//! HTTP implementation of the table transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::domain::{
    AppError, ListRecordsOptions, RecordPage, RecordPatch, SortDirection, TableError,
    TableRecord, TableTransport,
};

pub const DEFAULT_API_URL: &str = "https://api.airtable.com";

/// Configuration for the HTTP table transport.
#[derive(Clone)]
pub struct TableTransportConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
    /// Extra attempts for idempotent reads. Writes never retry.
    pub read_retries: u32,
    pub retry_delay: Duration,
}

impl TableTransportConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key,
            timeout: Duration::from_secs(15),
            read_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }

    /// Point the transport somewhere else (edge-function proxy, test server).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct RecordsEnvelope {
    records: Vec<TableRecord>,
}

#[derive(Debug, Deserialize)]
struct DeletedRecord {
    id: String,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct DeletedEnvelope {
    records: Vec<DeletedRecord>,
}

/// REST-backed [`TableTransport`].
pub struct HttpTableTransport {
    http: Client,
    config: TableTransportConfig,
}

impl HttpTableTransport {
    pub fn new(config: TableTransportConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Table(TableError::Http(e.to_string())))?;
        info!(api_url = %config.api_url, "Created table transport");
        Ok(Self { http, config })
    }

    fn record_url(&self, base: &str, table: &str) -> String {
        format!(
            "{}/v0/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            base,
            table
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.config.api_key.expose_secret())
    }

    fn list_query(options: &ListRecordsOptions) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(view) = &options.view {
            pairs.push(("view".to_string(), view.clone()));
        }
        if let Some(fields) = &options.fields {
            for field in fields {
                pairs.push(("fields[]".to_string(), field.clone()));
            }
        }
        if let Some(formula) = &options.filter_by_formula {
            pairs.push(("filterByFormula".to_string(), formula.clone()));
        }
        for (i, sort) in options.sort.iter().enumerate() {
            let direction = match sort.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            pairs.push((format!("sort[{i}][field]"), sort.field.clone()));
            pairs.push((format!("sort[{i}][direction]"), direction.to_string()));
        }
        if let Some(size) = options.page_size {
            pairs.push(("pageSize".to_string(), size.to_string()));
        }
        if let Some(offset) = &options.offset {
            pairs.push(("offset".to_string(), offset.clone()));
        }
        pairs
    }

    async fn response_error(response: Response) -> AppError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| match v.get("error") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(obj) => obj
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from),
                None => None,
            })
            .unwrap_or(text);
        AppError::Table(TableError::Request { status, message })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
        if !response.status().is_success() {
            return Err(Self::response_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| AppError::Table(TableError::Decode(e.to_string())))
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, AppError> {
        let response = self
            .authorized(self.http.get(url))
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Table(e.into()))?;
        Self::decode(response).await
    }

    /// GET with bounded retry. A 4xx from the service is the caller's
    /// mistake and is returned immediately.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, AppError> {
        let mut last_error = None;
        for attempt in 0..=self.config.read_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.get_once(url, query).await {
                Ok(value) => return Ok(value),
                Err(e @ AppError::Table(TableError::Request { status, .. })) if status < 500 => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt = attempt, url = %url, error = ?e, "Table read failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::Table(TableError::Http("Unknown error".to_string()))))
    }
}

#[async_trait]
impl TableTransport for HttpTableTransport {
    #[instrument(skip(self, options))]
    async fn list_records(
        &self,
        base: &str,
        table: &str,
        options: &ListRecordsOptions,
    ) -> Result<RecordPage, AppError> {
        let url = self.record_url(base, table);
        self.get_with_retry(&url, &Self::list_query(options)).await
    }

    #[instrument(skip(self))]
    async fn get_record(
        &self,
        base: &str,
        table: &str,
        record_id: &str,
    ) -> Result<TableRecord, AppError> {
        let url = format!("{}/{}", self.record_url(base, table), record_id);
        self.get_with_retry(&url, &[]).await
    }

    #[instrument(skip(self, fields))]
    async fn create_records(
        &self,
        base: &str,
        table: &str,
        fields: &[serde_json::Map<String, serde_json::Value>],
    ) -> Result<Vec<TableRecord>, AppError> {
        let body = serde_json::json!({
            "records": fields
                .iter()
                .map(|f| serde_json::json!({ "fields": f }))
                .collect::<Vec<_>>()
        });
        let response = self
            .authorized(self.http.post(self.record_url(base, table)))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Table(e.into()))?;
        let envelope: RecordsEnvelope = Self::decode(response).await?;
        Ok(envelope.records)
    }

    #[instrument(skip(self, patches))]
    async fn update_records(
        &self,
        base: &str,
        table: &str,
        patches: &[RecordPatch],
    ) -> Result<Vec<TableRecord>, AppError> {
        let body = serde_json::json!({ "records": patches });
        let response = self
            .authorized(self.http.patch(self.record_url(base, table)))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Table(e.into()))?;
        let envelope: RecordsEnvelope = Self::decode(response).await?;
        Ok(envelope.records)
    }

    #[instrument(skip(self))]
    async fn delete_records(
        &self,
        base: &str,
        table: &str,
        record_ids: &[String],
    ) -> Result<Vec<String>, AppError> {
        let query: Vec<(String, String)> = record_ids
            .iter()
            .map(|id| ("records[]".to_string(), id.clone()))
            .collect();
        let response = self
            .authorized(self.http.delete(self.record_url(base, table)))
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::Table(e.into()))?;
        let envelope: DeletedEnvelope = Self::decode(response).await?;
        Ok(envelope
            .records
            .into_iter()
            .filter(|r| r.deleted)
            .map(|r| r.id)
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_schema(&self, base: &str) -> Result<serde_json::Value, AppError> {
        let url = format!(
            "{}/v0/meta/bases/{}/tables",
            self.config.api_url.trim_end_matches('/'),
            base
        );
        self.get_with_retry(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SortSpec;

    #[test]
    fn test_record_url() {
        let transport = HttpTableTransport::new(
            TableTransportConfig::new(SecretString::from("key".to_string()))
                .with_api_url("https://proxy.example.com/"),
        )
        .unwrap();

        assert_eq!(
            transport.record_url("appBase", "Contacts"),
            "https://proxy.example.com/v0/appBase/Contacts"
        );
    }

    #[test]
    fn test_list_query_encoding() {
        let options = ListRecordsOptions {
            view: Some("Grid view".to_string()),
            fields: Some(vec!["Name".to_string(), "Email".to_string()]),
            filter_by_formula: Some("{Status}='Active'".to_string()),
            sort: vec![SortSpec {
                field: "Name".to_string(),
                direction: SortDirection::Desc,
            }],
            page_size: Some(50),
            offset: Some("itrABC".to_string()),
        };

        let pairs = HttpTableTransport::list_query(&options);
        assert!(pairs.contains(&("view".to_string(), "Grid view".to_string())));
        assert!(pairs.contains(&("fields[]".to_string(), "Name".to_string())));
        assert!(pairs.contains(&("fields[]".to_string(), "Email".to_string())));
        assert!(pairs.contains(&("sort[0][field]".to_string(), "Name".to_string())));
        assert!(pairs.contains(&("sort[0][direction]".to_string(), "desc".to_string())));
        assert!(pairs.contains(&("pageSize".to_string(), "50".to_string())));
        assert!(pairs.contains(&("offset".to_string(), "itrABC".to_string())));
    }

    #[test]
    fn test_list_query_empty_options() {
        let pairs = HttpTableTransport::list_query(&ListRecordsOptions::default());
        assert!(pairs.is_empty());
    }
}
