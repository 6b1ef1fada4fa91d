//! Authentication Middleware
//!
//! Bearer JWT validation for protected routes, and token issuing at
//! registration. The gateway reuses [`decode_token`] for its `?token=`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtSettings;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

/// Authenticated user extension
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

/// A signed access token and its lifetime in seconds.
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

/// Sign an access token for `user_id`.
pub fn issue_token(settings: &JwtSettings, user_id: i64) -> Result<IssuedToken, AppError> {
    let now = Utc::now();
    let lifetime = Duration::minutes(settings.access_token_expiry_minutes);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;

    Ok(IssuedToken {
        token,
        expires_in: lifetime.num_seconds(),
    })
}

/// Validate a token and return the user id it was issued for.
pub fn decode_token(secret: &str, token: &str) -> Result<i64, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".into())
        }
        _ => AppError::Unauthorized("Invalid token".into()),
    })?;

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token claims".into()))
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".into()))?;

    let user_id = decode_token(&state.settings.jwt.secret, token)?;

    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(expiry_minutes: i64) -> JwtSettings {
        JwtSettings {
            secret: "a-test-secret-that-is-long-enough-for-hs256".into(),
            access_token_expiry_minutes: expiry_minutes,
        }
    }

    #[test]
    fn test_issued_token_decodes_to_user() {
        let settings = settings(60);
        let issued = issue_token(&settings, 42).unwrap();
        assert_eq!(issued.expires_in, 3600);
        assert_eq!(decode_token(&settings.secret, &issued.token).unwrap(), 42);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired_token() {
        let issued = issue_token(&settings(60), 42).unwrap();
        assert!(matches!(
            decode_token("another-secret-that-is-also-long-enough", &issued.token),
            Err(AppError::Unauthorized(_))
        ));

        let expired = issue_token(&settings(-10), 42).unwrap();
        match decode_token(&settings(60).secret, &expired.token) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
