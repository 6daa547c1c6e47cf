//! JSON-file-backed store for the `{session_timeout, buffer_size, ...}`
//! key-value configuration the Session Manager re-reads on each attach.

use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use termbroker_types::TerminalConfig;
use tracing::warn;

pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<TerminalConfig>,
}

impl ConfigStore {
    pub async fn load(data_dir: &std::path::Path) -> Result<Self> {
        let path = data_dir.join("terminal_config.json");

        let current = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(error = %e, "config file unreadable, falling back to defaults");
                TerminalConfig::default()
            }),
            Err(_) => TerminalConfig::default(),
        };

        let store = Self {
            path,
            current: RwLock::new(current),
        };
        store.persist().await?;
        Ok(store)
    }

    pub fn get(&self) -> TerminalConfig {
        self.current.read().unwrap().clone()
    }

    pub async fn set(&self, config: TerminalConfig) -> Result<()> {
        *self.current.write().unwrap() = config;
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.current.read().unwrap().clone();
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("writing config to {}", self.path.display()))
    }
}
