use std::env;
use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use secrecy::SecretString;

use relay_gateway::api::{CorsConfig, RateLimitConfig, create_router_with_rate_limit};
use relay_gateway::app::AppState;
use relay_gateway::infra::observability::{init_metrics_handle, init_tracing};
use relay_gateway::infra::{
    BedrockConfig, BedrockLlmClient, RedisKvStore, SupabaseConfig, SupabaseDocumentStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    init_tracing();

    // Read required environment variables
    let api_key = env::var("RELAY_API_KEY").expect("RELAY_API_KEY must be set");
    let supabase_url = env::var("SUPABASE_URL").expect("SUPABASE_URL must be set");
    let supabase_key =
        env::var("SUPABASE_SERVICE_ROLE_KEY").expect("SUPABASE_SERVICE_ROLE_KEY must be set");

    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(3000);

    // Instantiate backend adapters once; they live for the whole process.
    let llm = Arc::new(BedrockLlmClient::connect(BedrockConfig::from_env()).await);
    let kv = Arc::new(RedisKvStore::with_defaults(&redis_url).await?);
    let documents = Arc::new(SupabaseDocumentStore::new(SupabaseConfig::new(
        supabase_url,
        SecretString::from(supabase_key),
    ))?);

    // Create shared application state
    let mut app_state = AppState::new(
        llm,
        kv,
        documents,
        SecretString::from(api_key),
        environment.clone(),
    );
    if let Some(handle) = init_metrics_handle() {
        app_state = app_state.with_metrics(handle);
    }
    let app_state = Arc::new(app_state);

    // Create the router with all routes, auth, rate limiting, and CORS
    let router = create_router_with_rate_limit(
        app_state,
        RateLimitConfig::from_env(),
        &CorsConfig::from_env(),
    );

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Relay gateway running on http://{addr}");
    println!("🏥 Health check: http://localhost:{port}/health");
    println!("🌍 Environment: {environment}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        _ = terminate => {},
    }

    println!("Shutdown signal received, shutting down gracefully");
}
