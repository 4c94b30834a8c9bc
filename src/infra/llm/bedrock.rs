//! AWS Bedrock runtime adapter for LLM inference.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use tracing::{info, instrument};

use crate::domain::{AppError, LlmClient, LlmError, ValidationError};

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Configuration for the Bedrock adapter.
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub region: String,
    pub model_id: String,
    /// Per-invocation timeout.
    pub call_timeout: Duration,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl BedrockConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            region: std::env::var("AWS_REGION").unwrap_or(defaults.region),
            model_id: std::env::var("BEDROCK_MODEL_ID").unwrap_or(defaults.model_id),
            call_timeout: defaults.call_timeout,
        }
    }
}

/// Bedrock-backed [`LlmClient`]. Credentials come from the standard AWS
/// provider chain (environment, profile, instance role).
pub struct BedrockLlmClient {
    client: BedrockClient,
    config: BedrockConfig,
}

impl BedrockLlmClient {
    /// Load AWS configuration and build the runtime client.
    pub async fn connect(config: BedrockConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let client = BedrockClient::new(&aws_config);
        info!(region = %config.region, model_id = %config.model_id, "Created Bedrock client");
        Self { client, config }
    }

    fn build_payload(prompt: &str, max_tokens: u32, temperature: f32) -> serde_json::Value {
        serde_json::json!({
            "anthropic_version": ANTHROPIC_VERSION,
            "max_tokens": max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": temperature
        })
    }
}

#[async_trait]
impl LlmClient for BedrockLlmClient {
    async fn health_check(&self) -> Result<(), AppError> {
        // The runtime API has no ping operation; a constructed client with a
        // resolved credential chain is the strongest cheap signal available.
        Ok(())
    }

    #[instrument(skip(self, prompt), fields(model_id = %self.config.model_id))]
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<serde_json::Value, AppError> {
        if prompt.is_empty() {
            return Err(AppError::Validation(ValidationError::MissingField(
                "prompt must not be empty".to_string(),
            )));
        }

        let payload = Self::build_payload(prompt, max_tokens, temperature);
        let body = Blob::new(serde_json::to_vec(&payload)?);

        let request = self
            .client
            .invoke_model()
            .model_id(self.config.model_id.as_str())
            .content_type("application/json")
            .accept("application/json")
            .body(body)
            .send();

        let output = tokio::time::timeout(self.config.call_timeout, request)
            .await
            .map_err(|_| {
                AppError::Llm(LlmError::Timeout(format!(
                    "invocation exceeded {:?}",
                    self.config.call_timeout
                )))
            })?
            .map_err(|e| {
                AppError::Llm(LlmError::Invocation(format!(
                    "{}",
                    DisplayErrorContext(&e)
                )))
            })?;

        let bytes = output.body().as_ref();
        if bytes.is_empty() {
            return Err(AppError::Llm(LlmError::EmptyResponse));
        }

        serde_json::from_slice(bytes)
            .map_err(|e| AppError::Llm(LlmError::Invocation(format!("invalid response body: {e}"))))
    }
}
