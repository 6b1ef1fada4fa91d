//! Custom Extractors
//!
//! Snowflake ids travel as decimal strings, in paths and in bodies.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

use crate::shared::error::AppError;

/// A single snowflake id taken from the route path.
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub i64);

impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        parse_id(&raw, "id").map(IdPath)
    }
}

/// Parse a snowflake id; `field` names it in the error.
pub fn parse_id(raw: &str, field: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Validation(format!("Invalid {}", field)))
}

/// Parse an optional snowflake id.
pub fn parse_optional_id(raw: Option<&str>, field: &str) -> Result<Option<i64>, AppError> {
    raw.map(|r| parse_id(r, field)).transpose()
}
