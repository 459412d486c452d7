mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn gateway_relays_upstream_body_unwrapped() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/proxy/rest/v1/notes?select=*", server.base_url))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-range").and_then(|v| v.to_str().ok()),
        Some("0-1/2")
    );

    // The body is the upstream array verbatim, not an envelope.
    let body = res.json::<serde_json::Value>().await?;
    assert!(body.is_array(), "expected raw upstream array: {body}");
    assert_eq!(body[0]["title"], "Spesa");

    Ok(())
}

#[tokio::test]
async fn gateway_swaps_caller_credentials_for_the_service_key() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/proxy/rest/v1/echo", server.base_url))
        .header("authorization", "Bearer caller-token")
        .header("apikey", "caller-anon-key")
        .header("x-client-info", "supabase-js/2.39.0")
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    let seen = &body["headers"];

    // The privileged credential always wins; caller credentials never leak.
    assert_eq!(seen["apikey"], "test-service-key");
    assert_eq!(seen["authorization"], "Bearer test-service-key");
    // Other caller headers are merged through.
    assert_eq!(seen["x-client-info"], "supabase-js/2.39.0");

    Ok(())
}

#[tokio::test]
async fn gateway_passes_non_json_upstream_bodies_through() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/proxy/rest/v1/plain", server.base_url))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/plain")
    );
    assert_eq!(res.text().await?, "pong");

    Ok(())
}

#[tokio::test]
async fn gateway_rejects_unknown_namespaces() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/proxy/admin/users", server.base_url))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "VALIDATION_ERROR");

    Ok(())
}

#[tokio::test]
async fn gateway_and_rpc_agree_on_the_same_logical_operation() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let gateway_body = client
        .get(format!(
            "{}/api/proxy/rest/v1/notes?select=*&limit=15",
            server.base_url
        ))
        .send()
        .await?
        .json::<serde_json::Value>()
        .await?;

    let rpc_envelope = client
        .post(format!("{}/api/proxy", server.base_url))
        .json(&json!({
            "method": "GET",
            "path": "/rest/v1/notes",
            "query": { "select": "*", "limit": "15" }
        }))
        .send()
        .await?
        .json::<serde_json::Value>()
        .await?;

    assert_eq!(gateway_body, rpc_envelope["data"]);

    Ok(())
}
