//! `POST /auth/login`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    access_token: String,
    token_type: &'static str,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let tokens = state
        .auth_service
        .login(&req.username, &req.password)
        .await
        .map_err(|e| {
            warn!(username = %req.username, error = %e, "login failed");
            StatusCode::UNAUTHORIZED
        })?;

    info!(username = %req.username, "login succeeded");
    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        token_type: tokens.token_type,
    }))
}
