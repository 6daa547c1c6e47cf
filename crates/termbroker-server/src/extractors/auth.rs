//! Bearer-token extractor shared by the control endpoints.

use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::AppState;

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub username: String,
}

pub struct AuthError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

pub fn extract_auth_user(parts: &Parts, state: &AppState) -> Result<AuthUser, AuthError> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: "missing Authorization header".to_string(),
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| AuthError {
        status: StatusCode::UNAUTHORIZED,
        message: "invalid Authorization format".to_string(),
    })?;

    state
        .auth_service
        .validate_token(token)
        .map(|username| AuthUser { username })
        .map_err(|e| AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: format!("invalid token: {e}"),
        })
}

/// Validates a token pulled from a websocket query parameter rather than a
/// header. Used by the `/terminal/ws/{session_id}` upgrade handler.
pub fn validate_query_token(state: &AppState, token: &str) -> Result<String, AuthError> {
    state
        .auth_service
        .validate_token(token)
        .map_err(|e| AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: format!("invalid token: {e}"),
        })
}
