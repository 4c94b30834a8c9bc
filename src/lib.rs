//! Relay Gateway
//!
//! An authenticated HTTP relay in front of several external backends (an LLM
//! inference API, a key-value store, and a document store), plus a typed
//! client for a third-party table service.
//!
//! # Architecture Overview
//!
//! This crate is organized into four main layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │  HTTP handlers, routing, auth gate, limits   │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │   Health aggregation, batch orchestration    │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │   Traits, types, errors (no dependencies)    │
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │  Bedrock, Redis, and PostgREST adapters      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Key Features
//!
//! - **Trait-based abstraction**: Every backend sits behind a domain trait
//! - **Dependency injection**: Adapters are constructed once and injected
//! - **Uniform envelope**: Every response is `{success, ...}` or
//!   `{success: false, error}`
//! - **Auth gate**: constant-time `x-api-key` check in front of every relay
//!   route
//! - **Typed table client**: cache-decorated facade over the table backend
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relay_gateway::api::create_router;
//! use relay_gateway::app::AppState;
//! use relay_gateway::infra::{BedrockConfig, BedrockLlmClient, RedisKvStore, SupabaseConfig, SupabaseDocumentStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let llm = Arc::new(BedrockLlmClient::connect(BedrockConfig::from_env()).await);
//!     let kv = Arc::new(RedisKvStore::with_defaults(&redis_url).await?);
//!     let documents = Arc::new(SupabaseDocumentStore::new(supabase_config)?);
//!
//!     let state = Arc::new(AppState::new(llm, kv, documents, api_key, environment));
//!     let router = create_router(state);
//!     axum::serve(listener, router).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod client;
pub mod domain;
pub mod infra;

// Mock adapters, shared between unit and integration tests.
pub mod test_utils;
