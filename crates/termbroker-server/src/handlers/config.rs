//! `GET`/`POST /config`.

use axum::extract::State;
use axum::Json;
use termbroker_types::TerminalConfig;

use crate::AppState;

pub async fn get(State(state): State<AppState>) -> Json<TerminalConfig> {
    Json(state.config_store.get())
}

pub async fn set(
    State(state): State<AppState>,
    Json(config): Json<TerminalConfig>,
) -> Result<Json<TerminalConfig>, axum::http::StatusCode> {
    state.manager.set_session_timeout(config.session_timeout);
    state.manager.set_buffer_size(config.buffer_size);

    state
        .config_store
        .set(config.clone())
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(config))
}
