//! LLM inference backend adapters.

pub mod bedrock;

pub use bedrock::{BedrockConfig, BedrockLlmClient, DEFAULT_MODEL_ID};
