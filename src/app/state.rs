//! Application state management.
//!
//! This module provides the shared application state that is
//! accessible to all request handlers via Axum's State extractor.

use std::sync::Arc;

use secrecy::SecretString;

use crate::domain::{DocumentStore, KvStore, LlmClient};
use crate::infra::observability::PrometheusHandle;

use super::service::AppService;

/// Shared application state for the Axum web server.
///
/// Holds thread-safe handles to the backend adapters behind their domain
/// traits, so handlers never know the concrete implementations. Everything
/// here is constructed once at process start and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    /// The application service orchestrating the backends.
    pub service: Arc<AppService>,

    /// LLM inference backend.
    pub llm: Arc<dyn LlmClient>,

    /// Key-value backend.
    pub kv: Arc<dyn KvStore>,

    /// Document-store backend.
    pub documents: Arc<dyn DocumentStore>,

    /// Shared relay secret checked by the auth gate.
    pub api_key: SecretString,

    /// Deployment environment label (`development` unless APP_ENV says so).
    pub environment: String,

    /// Prometheus render handle for GET /metrics, when a recorder installed.
    pub metrics: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates a new `AppState` wiring the service to the provided adapters.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        kv: Arc<dyn KvStore>,
        documents: Arc<dyn DocumentStore>,
        api_key: SecretString,
        environment: String,
    ) -> Self {
        let service = Arc::new(AppService::new(
            Arc::clone(&llm),
            Arc::clone(&kv),
            Arc::clone(&documents),
            environment.clone(),
        ));

        Self {
            service,
            llm,
            kv,
            documents,
            api_key,
            environment,
            metrics: None,
        }
    }

    /// Attach a Prometheus render handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: Arc<PrometheusHandle>) -> Self {
        self.metrics = Some(handle);
        self
    }
}
