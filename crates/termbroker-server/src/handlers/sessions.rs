//! Session control endpoints: list, status probe, cleanup sweep.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use termbroker_core::PersistenceSink;
use termbroker_types::{SessionStatusResponse, SessionSummary};
use tracing::error;

use crate::extractors::auth::extract_auth_user;
use crate::AppState;

/// `GET /terminal/sessions`
pub async fn list(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Result<Json<Vec<SessionSummary>>, StatusCode> {
    let (parts, _) = request.into_parts();
    let user = extract_auth_user(&parts, &state).map_err(|e| e.status)?;

    state
        .manager
        .list(Some(&user.username))
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "failed to list sessions");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// `GET /terminal/session/{id}/status`
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: axum::http::Request<axum::body::Body>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let (parts, _) = request.into_parts();
    extract_auth_user(&parts, &state).map_err(|e| e.status)?;

    if let Some(session) = state.manager.get(&id).await {
        let (rows, cols) = session.dims().await;
        return Ok(Json(SessionStatusResponse {
            exists: true,
            alive: session.is_alive().await,
            last_activity: Some(session.last_activity().await),
            connected_clients: Some(session.client_count().await),
            running_in_background: Some(session.is_alive().await),
            rows: Some(rows),
            cols: Some(cols),
            pid: Some(session.child_pid() as u32),
        }));
    }

    if let Ok(Some(record)) = state.db.get(&id).await {
        if record.active {
            return Ok(Json(SessionStatusResponse {
                exists: true,
                alive: false,
                last_activity: Some(record.last_activity),
                connected_clients: None,
                running_in_background: None,
                rows: Some(record.rows),
                cols: Some(record.cols),
                pid: record.pid.map(|p| p as u32),
            }));
        }
    }

    Ok(Json(SessionStatusResponse::missing()))
}

/// `POST /terminal/cleanup`
pub async fn cleanup(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let (parts, _) = request.into_parts();
    extract_auth_user(&parts, &state).map_err(|e| e.status)?;

    let closed = state.manager.cleanup().await.map_err(|e| {
        error!(error = %e, "cleanup pass failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(serde_json::json!({ "closed": closed })))
}
