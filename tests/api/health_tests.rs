//! Health Check API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new();

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_memory_storage() {
    let app = TestApp::new();

    let response = app.server.get("/health/ready").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(body["gateway"]["active_connections"], 0);
}

#[tokio::test]
async fn test_metrics_exposes_http_counters() {
    let app = TestApp::new();
    app.server.get("/health").await.assert_status_ok();

    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("social_chat_http_requests_total"));
}

#[tokio::test]
async fn test_gateway_rejects_plain_http() {
    let app = TestApp::new();

    let response = app.server.get("/gateway").await;

    assert!(response.status_code().is_client_error());
}
