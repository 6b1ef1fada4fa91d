//! # Social Chat Library
//!
//! A social messaging backend with:
//! - a friend graph with a request/accept workflow
//! - 1:1 private chats between friends, with read cursors and unread counts
//! - group chat rooms
//! - a WebSocket gateway for presence, typing and live delivery
//! - a RESTful HTTP API
//!
//! ## Architecture
//!
//! - **Domain Layer**: Core entities and repository traits
//! - **Application Layer**: Business services and DTOs
//! - **Infrastructure Layer**: PostgreSQL and in-memory repositories, metrics
//! - **Presentation Layer**: HTTP handlers and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! social_chat/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, repository traits
//! +-- application/    Services, DTOs, pagination
//! +-- infrastructure/ Storage backends and metrics
//! +-- presentation/   HTTP routes, middleware, WebSocket hub
//! +-- shared/         Errors, snowflake IDs, validation helpers
//! ```

pub mod config;

pub mod domain;

pub mod application;

pub mod infrastructure;

pub mod presentation;

pub mod shared;

// Application startup and state management
pub mod startup;

pub mod telemetry;
