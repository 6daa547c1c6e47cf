//! Serializable session views returned by the control endpoints.

use serde::{Deserialize, Serialize};

/// One row of `GET /terminal/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub username: String,
    pub last_activity: f64,
    pub created_at: f64,
    pub running: bool,
    pub rows: u16,
    pub cols: u16,
}

/// Response for `GET /terminal/session/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub exists: bool,
    pub alive: bool,
    pub last_activity: Option<f64>,
    pub connected_clients: Option<usize>,
    pub running_in_background: Option<bool>,
    pub rows: Option<u16>,
    pub cols: Option<u16>,
    pub pid: Option<u32>,
}

impl SessionStatusResponse {
    pub fn missing() -> Self {
        Self {
            exists: false,
            alive: false,
            last_activity: None,
            connected_clients: None,
            running_in_background: None,
            rows: None,
            cols: None,
            pid: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_has_no_session_fields() {
        let status = SessionStatusResponse::missing();
        assert!(!status.exists);
        assert!(!status.alive);
        assert!(status.pid.is_none());
    }
}
