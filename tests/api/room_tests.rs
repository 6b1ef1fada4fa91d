//! Room API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{TestApp, TestUser};

async fn create_room(app: &TestApp, owner: &TestUser, name: &str, visibility: &str) -> Value {
    let response = app
        .post(owner, "/api/v1/rooms")
        .json(&json!({ "name": name, "visibility": visibility }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_creator_becomes_admin() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let room = create_room(&app, &alice, "general", "public").await;

    assert_eq!(room["name"], "general");
    assert_eq!(room["created_by"], alice.id.as_str());
    assert_eq!(room["participants"][0]["user_id"], alice.id.as_str());
    assert_eq!(room["participants"][0]["role"], "admin");
}

#[tokio::test]
async fn test_blank_room_name_is_rejected() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    app.post(&alice, "/api/v1/rooms")
        .json(&json!({ "name": "   " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_public_listing_hides_private_rooms() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    create_room(&app, &alice, "lobby", "public").await;
    create_room(&app, &alice, "secret", "private").await;

    let public: Value = app.get(&alice, "/api/v1/rooms/public").await.json();
    let names: Vec<&str> = public
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["lobby"]);

    let mine: Value = app.get(&alice, "/api/v1/rooms").await.json();
    assert_eq!(mine.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_join_and_leave_membership() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice, "general", "public").await;
    let room_id = room["id"].as_str().unwrap();

    let joined: Value = app
        .post(&bob, &format!("/api/v1/rooms/{room_id}/join"))
        .await
        .json();
    assert_eq!(joined["participants"].as_array().map(Vec::len), Some(2));

    app.post(&bob, &format!("/api/v1/rooms/{room_id}/join"))
        .await
        .assert_status(StatusCode::CONFLICT);

    let left: Value = app
        .post(&bob, &format!("/api/v1/rooms/{room_id}/leave"))
        .await
        .json();
    assert_eq!(left["participants"].as_array().map(Vec::len), Some(1));

    app.post(&bob, &format!("/api/v1/rooms/{room_id}/leave"))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_room_history_is_for_participants_only() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice, "general", "public").await;
    let path = format!("/api/v1/rooms/{}/messages", room["id"].as_str().unwrap());

    let history = app.get(&alice, &path).await;
    history.assert_status_ok();
    let history: Value = history.json();
    assert_eq!(history["messages"].as_array().map(Vec::len), Some(0));
    assert_eq!(history["has_more"], false);

    app.get(&bob, &path).await.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_joining_unknown_room_is_not_found() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    app.post(&alice, "/api/v1/rooms/987654321/join")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
