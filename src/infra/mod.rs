//! Infrastructure layer implementations.

pub mod docstore;
pub mod kv;
pub mod llm;
pub mod observability;

pub use docstore::{SupabaseConfig, SupabaseDocumentStore};
pub use kv::{RedisKvConfig, RedisKvStore};
pub use llm::{BedrockConfig, BedrockLlmClient, DEFAULT_MODEL_ID};
