use anyhow::Result;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<()> {
    let fixture = common::fixture().await?;
    let (port, handle) = common::spawn_exporter(&fixture, None).await?;

    assert!(
        common::wait_for_server(port, 50).await,
        "Server failed to start"
    );

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", common::get_test_url(port)))
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["endpoints"], serde_json::json!(["/metrics"]));
    assert!(body["commit"].is_string());

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_health_endpoint_options_request() -> Result<()> {
    let fixture = common::fixture().await?;
    let (port, handle) = common::spawn_exporter(&fixture, None).await?;

    assert!(common::wait_for_server(port, 50).await);

    let client = reqwest::Client::new();
    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/health", common::get_test_url(port)),
        )
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_health_endpoint_has_x_app_header() -> Result<()> {
    let fixture = common::fixture().await?;
    let (port, handle) = common::spawn_exporter(&fixture, None).await?;

    assert!(common::wait_for_server(port, 50).await);

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", common::get_test_url(port)))
        .send()
        .await?;

    let x_app = response
        .headers()
        .get("X-App")
        .expect("X-App header should be present");

    let x_app_str = x_app.to_str()?;
    assert!(x_app_str.contains(env!("CARGO_PKG_NAME")));
    assert!(x_app_str.contains(env!("CARGO_PKG_VERSION")));

    handle.abort();

    Ok(())
}

#[tokio::test]
async fn test_health_endpoint_has_request_id() -> Result<()> {
    let fixture = common::fixture().await?;
    let (port, handle) = common::spawn_exporter(&fixture, None).await?;

    assert!(common::wait_for_server(port, 50).await);

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", common::get_test_url(port)))
        .header("x-request-id", "scrape-42")
        .send()
        .await?;

    assert_eq!(
        response.headers().get("x-request-id").map(|v| v.as_bytes()),
        Some(&b"scrape-42"[..])
    );

    handle.abort();

    Ok(())
}
