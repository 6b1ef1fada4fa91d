//! Common Test Utilities
//!
//! An in-memory application behind an axum-test server, plus helpers for
//! registering users and sending authenticated requests.

use axum::http::{header::AUTHORIZATION, HeaderValue};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};

use social_chat::config::{
    CorsSettings, DatabaseSettings, JwtSettings, MessagingSettings, ServerSettings, Settings,
    SnowflakeSettings, StorageBackend, WebSocketSettings,
};
use social_chat::infrastructure::Repositories;
use social_chat::startup::{build_router, AppState};

pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseSettings {
            backend: StorageBackend::Memory,
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 1,
        },
        jwt: JwtSettings {
            secret: "integration-test-secret-at-least-32-bytes".into(),
            access_token_expiry_minutes: 60,
        },
        snowflake: SnowflakeSettings { machine_id: 1 },
        cors: CorsSettings {
            allowed_origins: vec!["*".into()],
        },
        websocket: WebSocketSettings {
            max_message_size: 65536,
        },
        messaging: MessagingSettings::default(),
        environment: "test".into(),
    }
}

/// A registered user and their bearer token
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub token: String,
}

/// Test application backed by a fresh in-memory store
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::with_repositories(test_settings(), Repositories::in_memory(), None);
        let server = TestServer::new(build_router(state.clone())).unwrap();
        Self { server, state }
    }

    pub async fn register(&self, username: &str) -> TestUser {
        let response = self
            .server
            .post("/api/v1/users")
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: Value = response.json();
        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            username: username.to_string(),
            token: body["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Register two users and make them friends. Returns the private chat id.
    pub async fn befriend(&self, a: &TestUser, b: &TestUser) -> String {
        let request: Value = self
            .post(a, "/api/v1/friends/requests")
            .json(&json!({ "receiver_id": b.id }))
            .await
            .json();
        let request_id = request["id"].as_str().unwrap();

        let decision: Value = self
            .post(b, &format!("/api/v1/friends/requests/{request_id}/accept"))
            .await
            .json();
        decision["chat"]["id"].as_str().unwrap().to_string()
    }

    pub fn get(&self, user: &TestUser, path: &str) -> TestRequest {
        self.server.get(path).add_header(AUTHORIZATION, bearer(&user.token))
    }

    pub fn post(&self, user: &TestUser, path: &str) -> TestRequest {
        self.server.post(path).add_header(AUTHORIZATION, bearer(&user.token))
    }

    pub fn patch(&self, user: &TestUser, path: &str) -> TestRequest {
        self.server.patch(path).add_header(AUTHORIZATION, bearer(&user.token))
    }

    pub fn delete(&self, user: &TestUser, path: &str) -> TestRequest {
        self.server.delete(path).add_header(AUTHORIZATION, bearer(&user.token))
    }
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}
