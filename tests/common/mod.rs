use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{any, get},
    Router,
};
use serde_json::json;

/// In-process stand-in for the Supabase REST API.
pub struct MockUpstream {
    pub base_url: String,
}

pub async fn spawn_mock_upstream() -> MockUpstream {
    let app = Router::new()
        .route("/rest/v1/", get(|| async { Json(json!({})) }))
        .route("/rest/v1/notes", get(notes))
        .route("/rest/v1/echo", any(echo))
        .route("/rest/v1/plain", get(plain))
        .fallback(not_found);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock upstream");
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock upstream");
    });

    MockUpstream { base_url }
}

async fn notes() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_RANGE, "0-1/2"),
        ],
        Json(json!([
            { "id": 1, "title": "Spesa", "transcription": "comprare il latte" },
            { "id": 2, "title": "Riunione", "transcription": "spostata a lunedì" }
        ])),
    )
}

/// Echoes the request headers back so tests can assert on what the
/// forwarder actually sent upstream.
async fn echo(headers: HeaderMap) -> Json<serde_json::Value> {
    let seen: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), json!(v)))
        })
        .collect();
    Json(json!({ "headers": seen }))
}

async fn plain() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "pong")
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "relation does not exist" })),
    )
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    /// Spawn the already-built proxy binary against the given upstream.
    /// `extra_env` overrides the policy defaults per test.
    pub async fn spawn(upstream_url: &str, extra_env: &[(&str, &str)]) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Assumes debug profile; adjust if you run tests with --release
        let mut cmd = Command::new("target/debug/voicenotes-proxy");
        cmd.env("VOICENOTES_PORT", port.to_string())
            .env("SUPABASE_URL", upstream_url)
            .env("SUPABASE_SERVICE_ROLE_KEY", "test-service-key")
            .env("PROXY_RATE_LIMIT_ENABLED", "false")
            .env_remove("PROXY_ALLOWED_TABLES")
            .env_remove("PROXY_DENIED_TABLES")
            .env_remove("PROXY_BLOCKED_OPERATIONS")
            .env_remove("OPENAI_API_KEY")
            .env_remove("GEMINI_API_KEY")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (name, value) in extra_env {
            cmd.env(name, value);
        }

        let child = cmd.spawn().context("failed to spawn server binary")?;
        let server = Self { port, base_url, child };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!(
            "server did not become ready on {} within {:?}",
            self.base_url,
            timeout
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
