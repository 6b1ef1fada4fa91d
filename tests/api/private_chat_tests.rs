//! Private Chat and Message API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::TestApp;

#[tokio::test]
async fn test_chat_with_friend_is_stable() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    let from_alice: Value = app
        .get(&alice, &format!("/api/v1/private-chats/with/{}", bob.id))
        .await
        .json();
    let from_bob: Value = app
        .get(&bob, &format!("/api/v1/private-chats/with/{}", alice.id))
        .await
        .json();

    assert_eq!(from_alice["id"], chat_id.as_str());
    assert_eq!(from_bob["id"], chat_id.as_str());
    assert_eq!(from_alice["other_participant"]["username"], "bob");
    assert_eq!(from_alice["unread_count"], 0);
}

#[tokio::test]
async fn test_chat_with_stranger_is_forbidden() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    app.get(&alice, &format!("/api/v1/private-chats/with/{}", bob.id))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_message_flow_tracks_unread_and_receipts() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    let sent = app
        .post(&alice, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .json(&json!({ "content": "  hello bob  " }))
        .await;
    sent.assert_status(StatusCode::CREATED);
    let message: Value = sent.json();
    assert_eq!(message["content"], "hello bob");
    assert_eq!(message["private_chat_id"], chat_id.as_str());
    assert!(message["room_id"].is_null());
    let message_id = message["id"].as_str().unwrap().to_string();

    let chats: Value = app.get(&bob, "/api/v1/private-chats").await.json();
    assert_eq!(chats["chats"][0]["id"], chat_id.as_str());
    assert_eq!(chats["chats"][0]["unread_count"], 1);
    assert_eq!(chats["chats"][0]["last_message"]["id"], message_id.as_str());

    // The author never counts their own messages as unread.
    let own: Value = app
        .get(&alice, &format!("/api/v1/private-chats/{chat_id}"))
        .await
        .json();
    assert_eq!(own["unread_count"], 0);

    let first = app
        .post(&bob, &format!("/api/v1/messages/{message_id}/read"))
        .await;
    first.assert_status_ok();
    let first: Value = first.json();
    assert_eq!(first["newly_read"], true);
    // Bob never had a live connection, so the message was never delivered.
    assert_eq!(first["message"]["delivery_status"], "sent");
    assert_eq!(first["message"]["read_by"][0]["user_id"], bob.id.as_str());

    let again: Value = app
        .post(&bob, &format!("/api/v1/messages/{message_id}/read"))
        .await
        .json();
    assert_eq!(again["newly_read"], false);
    assert_eq!(again["message"]["read_by"].as_array().map(Vec::len), Some(1));

    let after: Value = app
        .get(&bob, &format!("/api/v1/private-chats/{chat_id}"))
        .await
        .json();
    assert_eq!(after["unread_count"], 0);
}

#[tokio::test]
async fn test_history_moves_read_cursor() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    for content in ["one", "two", "three"] {
        app.post(&alice, &format!("/api/v1/private-chats/{chat_id}/messages"))
            .json(&json!({ "content": content }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let history: Value = app
        .get(&bob, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .add_query_param("limit", 2)
        .await
        .json();
    let contents: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["two", "three"]);
    assert_eq!(history["has_more"], true);

    let summary: Value = app
        .get(&bob, &format!("/api/v1/private-chats/{chat_id}"))
        .await
        .json();
    assert_eq!(summary["unread_count"], 0);
}

#[tokio::test]
async fn test_mark_chat_read_defaults_to_latest() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    app.post(&alice, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .json(&json!({ "content": "ping" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = app
        .post(&bob, &format!("/api/v1/private-chats/{chat_id}/read"))
        .json(&json!({}))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["unread_count"], 0);
}

#[tokio::test]
async fn test_outsider_cannot_read_or_post() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let eve = app.register("eve").await;
    let chat_id = app.befriend(&alice, &bob).await;

    app.get(&eve, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    app.post(&eve, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .json(&json!({ "content": "let me in" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_empty_and_oversized_content_are_rejected() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;
    let path = format!("/api/v1/private-chats/{chat_id}/messages");

    app.post(&alice, &path)
        .json(&json!({ "content": "   " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.post(&alice, &path)
        .json(&json!({ "content": "x".repeat(1001) }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_message_type_is_rejected() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;
    let path = format!("/api/v1/private-chats/{chat_id}/messages");

    let response = app
        .post(&alice, &path)
        .json(&json!({ "content": "clip", "type": "video" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let created: Value = app
        .post(&alice, &path)
        .json(&json!({ "content": "pic", "type": "image" }))
        .await
        .json();
    assert_eq!(created["type"], "image");

    let history: Value = app.get(&bob, &path).await.json();
    let types: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["image"]);
}

#[tokio::test]
async fn test_only_author_may_edit() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    let message: Value = app
        .post(&alice, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .json(&json!({ "content": "typo" }))
        .await
        .json();
    let path = format!("/api/v1/messages/{}", message["id"].as_str().unwrap());

    app.patch(&bob, &path)
        .json(&json!({ "content": "hijacked" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let edited = app.patch(&alice, &path).json(&json!({ "content": "fixed" })).await;
    edited.assert_status_ok();
    let edited: Value = edited.json();
    assert_eq!(edited["content"], "fixed");
    assert_eq!(edited["is_edited"], true);
}

#[tokio::test]
async fn test_deleted_chat_rejects_messages() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let chat_id = app.befriend(&alice, &bob).await;

    let deleted = app
        .delete(&bob, &format!("/api/v1/private-chats/{chat_id}"))
        .await;
    deleted.assert_status_ok();
    assert_eq!(deleted.json::<Value>()["is_active"], false);

    app.post(&alice, &format!("/api/v1/private-chats/{chat_id}/messages"))
        .json(&json!({ "content": "anyone?" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let chats: Value = app.get(&alice, "/api/v1/private-chats").await.json();
    assert_eq!(chats["pagination"]["total"], 0);
}
