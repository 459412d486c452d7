use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, routing::{any, get, post}, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use voicenotes_proxy::config::AppConfig;
use voicenotes_proxy::middleware::{rate_limit, request_log, sanitize};
use voicenotes_proxy::proxy::types::ProxyRequest;
use voicenotes_proxy::{handlers, AppState};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up SUPABASE_URL and friends.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicenotes_proxy=info,tower_http=info".into()),
        )
        .init();

    // A broken security boundary must prevent startup entirely.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            std::process::exit(1);
        }
    };

    let port = config.server.port;
    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("Failed to initialize HTTP client: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        upstream = %state.config.upstream.base_url,
        rate_limiting = state.config.rate_limit.enabled,
        allowed_tables = state.config.policy.allowed_tables.len(),
        denied_tables = state.config.policy.denied_tables.len(),
        ai_configured = state.ai.is_some(),
        "configuration loaded"
    );

    let app = app(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("VoiceNotes proxy listening on http://{bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server");
}

fn app(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Database proxy: RPC envelope and gateway passthrough
        .route("/api/proxy", post(handlers::proxy::rpc_proxy))
        .route("/api/proxy/*path", any(handlers::proxy::gateway_proxy))
        // AI surfaces
        .route("/api/ask", post(handlers::ask::ask))
        .route("/api/embed", post(handlers::embed::embed))
        // Global middleware, outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(axum_middleware::from_fn(request_log::request_log_middleware))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit::rate_limit_middleware,
                ))
                .layer(axum_middleware::from_fn(sanitize::sanitize_middleware))
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(state)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "VoiceNotes Proxy (Rust)",
            "version": version,
            "description": "Secure Supabase proxy with AI question answering",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "proxy_rpc": "POST /api/proxy (JSON envelope: method, path, query, headers, body)",
                "proxy_gateway": "ANY /api/proxy/rest/v1/... (Supabase SDK passthrough)",
                "ask": "POST /api/ask (AI question answering over notes)",
                "embed": "POST /api/embed (on-demand embedding)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    // Probe the REST root through the forwarder so the credential path is
    // exercised too.
    let probe = ProxyRequest {
        method: axum::http::Method::GET,
        target_path: "/rest/v1/".to_string(),
        query: Vec::new(),
        headers: std::collections::HashMap::new(),
        body: None,
    };
    let result = state.forwarder.forward(&probe).await;

    if result.success {
        (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "upstream": "ok",
                    "upstream_latency_ms": result.duration_ms,
                }
            })),
        )
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "upstream unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "upstream_status": result.status_code,
                }
            })),
        )
    }
}
