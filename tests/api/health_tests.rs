//! Health Check API Tests

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use messenger_server::presentation::websocket::ConnectionHandle;
use pretty_assertions::assert_eq;

use crate::common::{body_json, TestApp};

#[tokio::test]
async fn health_check_returns_ok() {
    let app = TestApp::new();
    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn liveness_ignores_dependencies() {
    let app = TestApp::new();
    app.health.down.store(true, Ordering::SeqCst);

    let response = app.get("/health/live").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_reports_gateway_connections() {
    let app = TestApp::new();
    let (conn, _rx) = ConnectionHandle::channel();
    let _guard = app.state.gateway.register("alice", conn);

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["checks"]["gateway"]["active_connections"], 1);
    assert_eq!(body["checks"]["gateway"]["online_users"], 1);
}

#[tokio::test]
async fn readiness_fails_when_database_is_down() {
    let app = TestApp::new();
    app.health.down.store(true, Ordering::SeqCst);

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["checks"]["database"]["status"], "unhealthy");
}

#[tokio::test]
async fn metrics_endpoint_is_prometheus_text() {
    let app = TestApp::new();
    app.get("/health").await;

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
}
