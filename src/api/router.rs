//! HTTP routing configuration with auth, rate limiting, and request shaping.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode, header},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use governor::{Quota, RateLimiter};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::app::AppState;
use crate::domain::RateLimitBody;

use super::handlers::{
    batch_invoke_handler, bedrock_health_handler, cache_get_handler, cache_set_handler,
    doc_delete_handler, doc_insert_handler, doc_query_handler, doc_update_handler,
    hash_get_all_handler, hash_get_handler, hash_set_handler, health_check_handler,
    invoke_handler, kv_delete_handler, kv_get_handler, kv_set_handler, kv_stats_handler,
    list_push_handler, list_range_handler, metrics_handler, not_found_handler,
    redis_health_handler, root_handler, session_create_handler, session_delete_handler,
    session_get_handler, set_add_handler, set_members_handler, supabase_health_handler,
};
use super::middleware::auth_middleware;

/// Inbound JSON bodies are capped at 10 MB.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// End-to-end request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for relay endpoints
    pub api_rps: u32,
    /// Burst size for relay endpoints
    pub api_burst: u32,
    /// Requests per second for health endpoints
    pub health_rps: u32,
    /// Burst size for health endpoints
    pub health_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api_rps: 10,
            api_burst: 20,
            health_rps: 100,
            health_burst: 100,
        }
    }
}

impl RateLimitConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let api_rps = std::env::var("RATE_LIMIT_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let api_burst = std::env::var("RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Self {
            api_rps,
            api_burst,
            health_rps: 100,
            health_burst: 100,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl CorsConfig {
    /// Comma-separated `ALLOWED_ORIGINS`, or the default local origin.
    pub fn from_env() -> Self {
        match std::env::var("ALLOWED_ORIGINS") {
            Ok(raw) if !raw.is_empty() => Self {
                allowed_origins: raw.split(',').map(|s| s.trim().to_string()).collect(),
            },
            _ => Self::default(),
        }
    }

    fn layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static("x-api-key"),
            ]);

        if self.allowed_origins.iter().any(|o| o == "*") {
            layer.allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            layer.allow_origin(origins).allow_credentials(true)
        }
    }
}

/// Shared rate limiter state (keyed by client IP to prevent global DoS)
pub struct RateLimitState {
    api_limiter: governor::RateLimiter<
        IpAddr,
        governor::state::keyed::DashMapStateStore<IpAddr>,
        governor::clock::DefaultClock,
    >,
    health_limiter: governor::RateLimiter<
        IpAddr,
        governor::state::keyed::DashMapStateStore<IpAddr>,
        governor::clock::DefaultClock,
    >,
    config: RateLimitConfig,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        let api_quota = Quota::per_second(NonZeroU32::new(config.api_rps).unwrap())
            .allow_burst(NonZeroU32::new(config.api_burst).unwrap());
        let health_quota = Quota::per_second(NonZeroU32::new(config.health_rps).unwrap())
            .allow_burst(NonZeroU32::new(config.health_burst).unwrap());

        Self {
            api_limiter: RateLimiter::dashmap(api_quota),
            health_limiter: RateLimiter::dashmap(health_quota),
            config,
        }
    }
}

/// Extract client IP from request (X-Forwarded-For, X-Real-IP, or ConnectInfo).
/// Falls back to 0.0.0.0 when unknown to avoid blocking; unknown clients share one bucket.
fn client_ip_from_request<B>(request: &Request<B>) -> IpAddr {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(first) = s.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }
    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(s) = real_ip.to_str() {
            if let Ok(ip) = s.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(addr) = request.extensions().get::<SocketAddr>() {
        return addr.ip();
    }
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn rate_limited_response(config: &RateLimitConfig, retry_after: u64) -> Response<Body> {
    let body = RateLimitBody {
        success: false,
        error: "Too many requests from this IP, please try again later.".to_string(),
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        config.api_rps.to_string().parse().unwrap(),
    );
    headers.insert("X-RateLimit-Remaining", "0".parse().unwrap());
    headers.insert("Retry-After", retry_after.to_string().parse().unwrap());
    response
}

/// Rate limit middleware for relay endpoints (per-IP to prevent global DoS)
async fn rate_limit_api_middleware(
    State(rate_limit): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let client_ip = client_ip_from_request(&request);
    match rate_limit.api_limiter.check_key(&client_ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                "X-RateLimit-Limit",
                rate_limit.config.api_rps.to_string().parse().unwrap(),
            );
            response
        }
        Err(not_until) => {
            let wait_time = not_until.wait_time_from(governor::clock::Clock::now(
                &governor::clock::DefaultClock::default(),
            ));
            rate_limited_response(&rate_limit.config, wait_time.as_secs())
        }
    }
}

/// Rate limit middleware for health endpoints (per-IP, looser quota)
async fn rate_limit_health_middleware(
    State(rate_limit): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let client_ip = client_ip_from_request(&request);
    match rate_limit.health_limiter.check_key(&client_ip) {
        Ok(_) => next.run(request).await,
        Err(not_until) => {
            let wait_time = not_until.wait_time_from(governor::clock::Clock::now(
                &governor::clock::DefaultClock::default(),
            ));
            rate_limited_response(&rate_limit.config, wait_time.as_secs())
        }
    }
}

fn bedrock_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/invoke", post(invoke_handler))
        .route("/batch", post(batch_invoke_handler))
        .route("/health", get(bedrock_health_handler))
}

fn redis_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/get/{key}", get(kv_get_handler))
        .route("/set", post(kv_set_handler))
        .route("/delete/{key}", delete(kv_delete_handler))
        .route("/hash/set", post(hash_set_handler))
        .route("/hash/get/{key}/{field}", get(hash_get_handler))
        .route("/hash/getall/{key}", get(hash_get_all_handler))
        .route("/list/push", post(list_push_handler))
        .route("/list/range/{key}", get(list_range_handler))
        .route("/set/add", post(set_add_handler))
        .route("/set/members/{key}", get(set_members_handler))
        .route("/session/create", post(session_create_handler))
        .route(
            "/session/{session_id}",
            get(session_get_handler).delete(session_delete_handler),
        )
        .route("/cache/set", post(cache_set_handler))
        .route("/cache/{key}", get(cache_get_handler))
        .route("/stats", get(kv_stats_handler))
        .route("/health", get(redis_health_handler))
}

fn supabase_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/data/{table}",
            get(doc_query_handler).post(doc_insert_handler),
        )
        .route(
            "/data/{table}/{id}",
            put(doc_update_handler).delete(doc_delete_handler),
        )
        .route("/health", get(supabase_health_handler))
}

/// Create router without rate limiting
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let api_routes = Router::new()
        .nest("/bedrock", bedrock_routes())
        .nest("/redis", redis_routes())
        .nest("/supabase", supabase_routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&app_state),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .fallback(not_found_handler)
        .layer(middleware_stack)
        .with_state(app_state)
}

/// Create router with rate limiting and CORS enabled
pub fn create_router_with_rate_limit(
    app_state: Arc<AppState>,
    rate_config: RateLimitConfig,
    cors_config: &CorsConfig,
) -> Router {
    let rate_limit_state = Arc::new(RateLimitState::new(rate_config));

    let middleware_stack = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_config.layer());

    let api_routes = Router::new()
        .nest("/bedrock", bedrock_routes())
        .nest("/redis", redis_routes())
        .nest("/supabase", supabase_routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&app_state),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&rate_limit_state),
            rate_limit_api_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health_check_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&rate_limit_state),
            rate_limit_health_middleware,
        ));

    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .merge(health_routes)
        .nest("/api", api_routes)
        .fallback(not_found_handler)
        .layer(middleware_stack)
        .with_state(app_state)
}
