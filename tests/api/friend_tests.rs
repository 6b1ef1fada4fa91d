//! Friend API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::TestApp;

#[tokio::test]
async fn test_accept_creates_friendship_and_chat() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let sent = app
        .post(&alice, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": bob.id, "message": "hi bob" }))
        .await;
    sent.assert_status(StatusCode::CREATED);
    let request: Value = sent.json();
    assert_eq!(request["status"], "pending");
    assert_eq!(request["message"], "hi bob");

    let received: Value = app
        .get(&bob, "/api/v1/friends/requests/received")
        .await
        .json();
    assert_eq!(received["requests"][0]["id"], request["id"]);
    assert_eq!(received["requests"][0]["user"]["username"], "alice");

    let accepted = app
        .post(
            &bob,
            &format!("/api/v1/friends/requests/{}/accept", request["id"].as_str().unwrap()),
        )
        .await;
    accepted.assert_status_ok();
    let decision: Value = accepted.json();
    assert_eq!(decision["request"]["status"], "accepted");
    assert_eq!(decision["chat"]["is_active"], true);

    let friends: Value = app.get(&alice, "/api/v1/friends").await.json();
    assert_eq!(friends["friends"][0]["username"], "bob");
    assert_eq!(friends["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_self_request_is_rejected() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let response = app
        .post(&alice, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": alice.id }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_pending_request_conflicts_in_either_direction() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    app.post(&alice, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": bob.id }))
        .await
        .assert_status(StatusCode::CREATED);

    app.post(&bob, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": alice.id }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_only_receiver_may_accept() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let request: Value = app
        .post(&alice, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": bob.id }))
        .await
        .json();
    let path = format!(
        "/api/v1/friends/requests/{}/accept",
        request["id"].as_str().unwrap()
    );

    app.post(&alice, &path).await.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_decided_request_cannot_be_decided_again() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let request: Value = app
        .post(&alice, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": bob.id }))
        .await
        .json();
    let id = request["id"].as_str().unwrap();

    let declined: Value = app
        .post(&bob, &format!("/api/v1/friends/requests/{id}/decline"))
        .await
        .json();
    assert_eq!(declined["request"]["status"], "declined");
    assert!(declined.get("chat").is_none());

    app.post(&bob, &format!("/api/v1/friends/requests/{id}/accept"))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_sender_can_cancel_pending_request() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let request: Value = app
        .post(&alice, "/api/v1/friends/requests")
        .json(&json!({ "receiver_id": bob.id }))
        .await
        .json();
    let id = request["id"].as_str().unwrap();

    let cancelled = app
        .post(&alice, &format!("/api/v1/friends/requests/{id}/cancel"))
        .await;
    cancelled.assert_status_ok();
    assert_eq!(cancelled.json::<Value>()["status"], "cancelled");

    let pending: Value = app
        .get(&bob, "/api/v1/friends/requests/received")
        .await
        .json();
    assert_eq!(pending["requests"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_remove_friend_deactivates_chat() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    app.delete(&alice, &format!("/api/v1/friends/{}", bob.id))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let friends: Value = app.get(&bob, "/api/v1/friends").await.json();
    assert_eq!(friends["pagination"]["total"], 0);

    let chat: Value = app
        .get(&alice, &format!("/api/v1/private-chats/{chat_id}"))
        .await
        .json();
    assert_eq!(chat["is_active"], false);

    app.get(&alice, &format!("/api/v1/private-chats/with/{}", bob.id))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.delete(&alice, &format!("/api/v1/friends/{}", bob.id))
        .await
        .assert_status(StatusCode::CONFLICT);
}
