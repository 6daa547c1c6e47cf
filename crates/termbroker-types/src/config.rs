//! The "external key-value configuration store" from the broker's point of
//! view: a small JSON document holding `session_timeout` and `buffer_size`
//! plus a few cosmetic terminal defaults. See `termbroker-server::services::config`
//! for the store that reads/writes this shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    pub default_path: String,
    pub shell: String,
    pub font_size: u32,
    pub theme: String,
    pub refresh_interval: u32,
    /// Idle bound, in seconds, past which a session is eligible for reclamation.
    pub session_timeout: i64,
    /// Output History bound, in chunks.
    pub buffer_size: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_path: "~".to_string(),
            shell: "/bin/bash".to_string(),
            font_size: 14,
            theme: "dark".to_string(),
            refresh_interval: 3,
            session_timeout: 3600 * 24 * 7,
            buffer_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_seven_day_timeout() {
        let cfg = TerminalConfig::default();
        assert_eq!(cfg.session_timeout, 604_800);
        assert_eq!(cfg.buffer_size, 1000);
    }

    #[test]
    fn partial_json_fills_remaining_fields_with_defaults() {
        let cfg: TerminalConfig = serde_json::from_str(r#"{"buffer_size": 5}"#).unwrap();
        assert_eq!(cfg.buffer_size, 5);
        assert_eq!(cfg.shell, "/bin/bash");
    }
}
