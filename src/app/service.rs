//! Application service layer.
//!
//! Orchestrates operations across the backend adapters through their trait
//! abstractions: input validation for model invocations, the batch fan-out,
//! and health aggregation.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, BatchItem, DocumentStore, HealthResponse, HealthStatus, InvokeRequest, KvStore,
    LlmClient, ServicesHealth,
};

/// Defaults applied to batch entries, matching the single-invoke defaults.
const BATCH_MAX_TOKENS: u32 = 1000;
const BATCH_TEMPERATURE: f32 = 0.7;

pub struct AppService {
    llm: Arc<dyn LlmClient>,
    kv: Arc<dyn KvStore>,
    documents: Arc<dyn DocumentStore>,
    environment: String,
}

impl AppService {
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        kv: Arc<dyn KvStore>,
        documents: Arc<dyn DocumentStore>,
        environment: String,
    ) -> Self {
        Self {
            llm,
            kv,
            documents,
            environment,
        }
    }

    /// Validate and run a single model invocation.
    #[instrument(skip(self, request))]
    pub async fn invoke_model(
        &self,
        request: &InvokeRequest,
    ) -> Result<serde_json::Value, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed for invoke request");
            AppError::from(e)
        })?;

        metrics::counter!("relay_llm_invocations_total").increment(1);
        self.llm
            .invoke(&request.prompt, request.max_tokens, request.temperature)
            .await
    }

    /// Run every prompt concurrently. Entries fail independently; a failed
    /// prompt never cancels its siblings.
    #[instrument(skip(self, prompts), fields(count = prompts.len()))]
    pub async fn batch_invoke(&self, prompts: &[String]) -> Vec<BatchItem> {
        let calls = prompts.iter().map(|prompt| async move {
            match self
                .llm
                .invoke(prompt, BATCH_MAX_TOKENS, BATCH_TEMPERATURE)
                .await
            {
                Ok(response) => BatchItem {
                    success: true,
                    prompt: prompt.clone(),
                    response: Some(response),
                    error: None,
                },
                Err(e) => BatchItem {
                    success: false,
                    prompt: prompt.clone(),
                    response: None,
                    error: Some(e.to_string()),
                },
            }
        });

        let results = futures::future::join_all(calls).await;
        let failed = results.iter().filter(|item| !item.success).count();
        if failed > 0 {
            warn!(failed = failed, total = results.len(), "Batch completed with failures");
        } else {
            info!(total = results.len(), "Batch completed");
        }
        results
    }

    /// Probe all backends concurrently and aggregate.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let (llm, kv, documents) = tokio::join!(
            self.llm.health_check(),
            self.kv.health_check(),
            self.documents.health_check()
        );

        let status_of = |name: &str, result: Result<(), AppError>| match result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(service = name, error = ?e, "Health check failed");
                HealthStatus::Unhealthy
            }
        };

        HealthResponse::new(
            self.environment.clone(),
            ServicesHealth {
                bedrock: status_of("bedrock", llm),
                supabase: status_of("supabase", documents),
                redis: status_of("redis", kv),
            },
        )
    }
}
