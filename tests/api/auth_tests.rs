//! Authentication API Tests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{body_json, refresh_cookie, test_settings, TestApp, TEST_PASSWORD};

fn credentials(username: &str, password: &str) -> serde_json::Value {
    json!({ "username": username, "password": password })
}

#[tokio::test]
async fn register_issues_token_pair_and_cookie() {
    let app = TestApp::new();

    let response = app
        .post_json("/api/v1/auth/register", credentials("alice", TEST_PASSWORD))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/api/v1/auth"));
    assert!(cookie.contains("SameSite=Strict"));

    let cookie_token = refresh_cookie(&response).unwrap();
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["refresh_token"], cookie_token.as_str());
    assert!(app.state.tokens.verify(body["access_token"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = TestApp::new();
    app.register("alice").await;

    let response = app
        .post_json("/api/v1/auth/register", credentials("alice", TEST_PASSWORD))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "conflict");
}

#[tokio::test]
async fn malformed_credentials_are_rejected() {
    let app = TestApp::new();

    let short_password = app.post_json("/api/v1/auth/register", credentials("alice", "123")).await;
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);

    let bad_username = app
        .post_json("/api/v1/auth/register", credentials("no spaces", TEST_PASSWORD))
        .await;
    assert_eq!(bad_username.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_checks_password() {
    let app = TestApp::new();
    app.register("alice").await;

    let ok = app.post_json("/api/v1/auth/login", credentials("alice", TEST_PASSWORD)).await;
    assert_eq!(ok.status(), StatusCode::OK);

    let wrong = app.post_json("/api/v1/auth/login", credentials("alice", "wrong-password")).await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let unknown = app.post_json("/api/v1/auth/login", credentials("nobody", TEST_PASSWORD)).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotates_and_reuse_compromises_every_session() {
    let app = TestApp::new();
    let registered = app
        .post_json("/api/v1/auth/register", credentials("alice", TEST_PASSWORD))
        .await;
    let first = body_json(registered).await["refresh_token"].as_str().unwrap().to_string();

    let other_device = app.post_json("/api/v1/auth/login", credentials("alice", TEST_PASSWORD)).await;
    let other = body_json(other_device).await["refresh_token"].as_str().unwrap().to_string();

    let rotated = app.post_json("/api/v1/auth/refresh", json!({ "refresh_token": first })).await;
    assert_eq!(rotated.status(), StatusCode::OK);
    let second = body_json(rotated).await["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(second, first);

    let reuse = app.post_json("/api/v1/auth/refresh", json!({ "refresh_token": first })).await;
    assert_eq!(reuse.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(reuse).await["error"], "reuse_detected");

    let records = app.store.token_records("alice");
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.revoked && r.compromised));

    for stale in [second, other] {
        let response = app.post_json("/api/v1/auth/refresh", json!({ "refresh_token": stale })).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn refresh_reads_cookie_when_body_is_absent() {
    let app = TestApp::new();
    let registered = app
        .post_json("/api/v1/auth/register", credentials("alice", TEST_PASSWORD))
        .await;
    let token = refresh_cookie(&registered).unwrap();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/refresh")
                .header(header::COOKIE, format!("refresh_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(refresh_cookie(&response).is_some_and(|t| t != token));
}

#[tokio::test]
async fn refresh_without_token_is_unauthorized() {
    let app = TestApp::new();
    let response = app.post_json("/api/v1/auth/refresh", json!({})).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_token_and_clears_cookie() {
    let app = TestApp::new();
    let registered = app
        .post_json("/api/v1/auth/register", credentials("alice", TEST_PASSWORD))
        .await;
    let token = body_json(registered).await["refresh_token"].as_str().unwrap().to_string();

    let logout = app.post_json("/api/v1/auth/logout", json!({ "refresh_token": token })).await;
    assert_eq!(logout.status(), StatusCode::OK);
    let cleared = logout
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cleared.contains("Max-Age=0"));

    let refresh = app.post_json("/api/v1/auth/refresh", json!({ "refresh_token": token })).await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(refresh).await["error"], "invalid_token");
}

#[tokio::test]
async fn logout_all_revokes_every_device() {
    let app = TestApp::new();
    let access = app.register("alice").await;
    let login = app.post_json("/api/v1/auth/login", credentials("alice", TEST_PASSWORD)).await;
    assert_eq!(login.status(), StatusCode::OK);

    let anonymous = app.post_json("/api/v1/auth/logout-all", json!({})).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let response = app.empty_auth("POST", "/api/v1/auth/logout-all", &access).await;
    assert_eq!(response.status(), StatusCode::OK);

    let records = app.store.token_records("alice");
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.revoked && !r.compromised));
}

#[tokio::test]
async fn auth_endpoints_are_rate_limited_per_client() {
    let mut settings = test_settings();
    settings.rate_limit.max_auth = 2;
    let app = TestApp::with_settings(settings);

    let login = |ip: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Forwarded-For", ip)
            .body(Body::from(credentials("nobody", TEST_PASSWORD).to_string()))
            .unwrap()
    };

    assert_eq!(app.send(login("10.0.0.1")).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.send(login("10.0.0.1")).await.status(), StatusCode::UNAUTHORIZED);

    let limited = app.send(login("10.0.0.1")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));

    assert_eq!(app.send(login("10.0.0.2")).await.status(), StatusCode::UNAUTHORIZED);
}
