//! User API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_case::test_case;

use crate::common::TestApp;

#[tokio::test]
async fn test_register_returns_user_and_token() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/api/v1/users")
        .json(&json!({ "username": "alice", "email": "alice@example.com" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[test_case(json!({ "username": "al", "email": "al@example.com" }) ; "short username")]
#[test_case(json!({ "username": "alice", "email": "not-an-email" }) ; "invalid email")]
#[tokio::test]
async fn test_register_rejects_invalid_input(body: Value) {
    let app = TestApp::new();

    let response = app.server.post("/api/v1/users").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_duplicate_username_conflicts() {
    let app = TestApp::new();
    app.register("alice").await;

    let response = app
        .server
        .post("/api/v1/users")
        .json(&json!({ "username": "alice", "email": "other@example.com" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_current_user_requires_token() {
    let app = TestApp::new();

    let response = app.server.get("/api/v1/users/@me").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_current_user_includes_email() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let response = app.get(&alice, "/api/v1/users/@me").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], alice.id.as_str());
    assert_eq!(body["email"], "alice@example.com");
}

#[tokio::test]
async fn test_other_user_profile_hides_email() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let response = app.get(&alice, &format!("/api/v1/users/{}", bob.id)).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["username"], "bob");
    assert!(body.get("email").is_none());
}

#[test_case("abc" ; "not a number")]
#[test_case("0" ; "zero")]
#[tokio::test]
async fn test_malformed_user_id_is_rejected(id: &str) {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let response = app.get(&alice, &format!("/api/v1/users/{id}")).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let response = app.get(&alice, "/api/v1/users/123456789").await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_online_users_excludes_offline_accounts() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    app.register("bob").await;

    let response = app.get(&alice, "/api/v1/users/online").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body.as_array().map(Vec::len), Some(0));
}
