//! HTTP and WebSocket handlers.

pub mod auth;
pub mod config;
pub mod sessions;
pub mod ws;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
