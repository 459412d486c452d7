mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn dangerous_rpc_body_is_blocked_with_audit_code() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/proxy", server.base_url))
        .json(&json!({
            "method": "POST",
            "path": "/rest/v1/notes",
            "body": { "query": "TRUNCATE TABLE notes" }
        }))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "DANGEROUS_METHOD_BLOCKED");
    for field in ["errore", "messaggio", "dettagli", "timestamp"] {
        assert!(body.get(field).is_some(), "missing field {field}: {body}");
    }

    Ok(())
}

#[tokio::test]
async fn dangerous_gateway_body_is_blocked_too() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(&upstream.base_url, &[]).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/proxy/rest/v1/notes", server.base_url))
        .json(&json!({ "sql": "drop table notes" }))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "DANGEROUS_METHOD_BLOCKED");

    Ok(())
}

#[tokio::test]
async fn operator_configured_keywords_extend_the_baseline() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(
        &upstream.base_url,
        &[("PROXY_BLOCKED_OPERATIONS", "vacuum,reindex")],
    )
    .await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/proxy", server.base_url))
        .json(&json!({
            "method": "POST",
            "path": "/rest/v1/notes",
            "body": { "query": "VACUUM FULL notes" }
        }))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn allow_list_admits_members_and_denies_others() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(
        &upstream.base_url,
        &[("PROXY_ALLOWED_TABLES", "notes")],
    )
    .await?;
    let client = reqwest::Client::new();

    let allowed = client
        .get(format!("{}/api/proxy/rest/v1/notes", server.base_url))
        .send()
        .await?;
    assert_eq!(allowed.status(), StatusCode::OK);

    let denied = client
        .get(format!("{}/api/proxy/rest/v1/secrets", server.base_url))
        .send()
        .await?;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    let body = denied.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "TABLE_ACCESS_DENIED");
    assert_eq!(body["tabella"], "secrets");

    Ok(())
}

#[tokio::test]
async fn deny_list_blocks_members_only() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(
        &upstream.base_url,
        &[("PROXY_DENIED_TABLES", "internal_logs")],
    )
    .await?;
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("{}/api/proxy/rest/v1/internal_logs", server.base_url))
        .send()
        .await?;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let allowed = client
        .get(format!("{}/api/proxy/rest/v1/notes", server.base_url))
        .send()
        .await?;
    assert_eq!(allowed.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn deny_list_overrides_allow_list() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(
        &upstream.base_url,
        &[
            ("PROXY_ALLOWED_TABLES", "notes"),
            ("PROXY_DENIED_TABLES", "notes"),
        ],
    )
    .await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/proxy/rest/v1/notes", server.base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "TABLE_ACCESS_DENIED");

    Ok(())
}

#[tokio::test]
async fn unresolvable_table_is_denied_under_an_allow_list() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(
        &upstream.base_url,
        &[("PROXY_ALLOWED_TABLES", "notes")],
    )
    .await?;
    let client = reqwest::Client::new();

    // An auth-namespace path resolves no table name.
    let res = client
        .post(format!("{}/api/proxy", server.base_url))
        .json(&json!({ "method": "POST", "path": "/auth/v1/token" }))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "TABLE_ACCESS_DENIED");
    assert!(body["tabella"].is_null());

    Ok(())
}

#[tokio::test]
async fn rate_limit_returns_429_after_budget_is_spent() -> Result<()> {
    let upstream = common::spawn_mock_upstream().await;
    let server = common::TestServer::spawn(
        &upstream.base_url,
        &[
            ("PROXY_RATE_LIMIT_ENABLED", "true"),
            ("PROXY_RATE_LIMIT_REQUESTS", "3"),
            ("PROXY_RATE_LIMIT_WINDOW_SECS", "60"),
        ],
    )
    .await?;
    let client = reqwest::Client::new();

    // A dedicated forwarded-for keeps this bucket separate from the
    // readiness probe's.
    let send = || {
        client
            .post(format!("{}/api/proxy", server.base_url))
            .header("x-forwarded-for", "203.0.113.7")
            .json(&json!({ "method": "GET", "path": "/rest/v1/notes" }))
            .send()
    };

    for _ in 0..3 {
        let res = send().await?;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = send().await?;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["codice"], "PROXY_RATE_LIMIT_EXCEEDED");

    Ok(())
}
