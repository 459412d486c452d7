mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn root_lists_endpoints() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["endpoints"]["proxy_rpc"].is_string());

    Ok(())
}

#[tokio::test]
async fn health_reports_upstream_ok() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["upstream"], "ok");

    Ok(())
}

#[tokio::test]
async fn ask_without_provider_key_reports_503() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/ask", server.base_url))
        .json(&json!({ "question": "cosa devo comprare?" }))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "AI_NOT_CONFIGURED");

    Ok(())
}

#[tokio::test]
async fn ask_validates_the_question_before_provider_lookup() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/ask", server.base_url))
        .json(&json!({ "question": "   " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/api/ask", server.base_url))
        .json(&json!({ "question": "x".repeat(2001) }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "VALIDATION_ERROR");

    Ok(())
}

#[tokio::test]
async fn embed_validates_text_and_reports_missing_provider() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/embed", server.base_url))
        .json(&json!({ "text": "" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/api/embed", server.base_url))
        .json(&json!({ "text": "una nota qualsiasi" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "AI_NOT_CONFIGURED");

    Ok(())
}
