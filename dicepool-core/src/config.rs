//! Engine configuration.
//!
//! Settings the host would normally keep in its settings registry are passed
//! explicitly through the test context instead.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rule switches for test resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cap hits at the test's limit.
    pub apply_limits: bool,

    /// Allow rolling a skill test without the skill (attribute only, -1 die).
    pub allow_defaulting: bool,

    /// Give the summoner's players owner access to a newly bound spirit.
    pub grant_summoner_ownership: bool,

    /// Ask the dialog collaborator before rolling.
    pub show_dialogs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apply_limits: true,
            allow_defaulting: true,
            grant_summoner_ownership: true,
            show_dialogs: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_limits(mut self, apply_limits: bool) -> Self {
        self.apply_limits = apply_limits;
        self
    }

    pub fn with_allow_defaulting(mut self, allow_defaulting: bool) -> Self {
        self.allow_defaulting = allow_defaulting;
        self
    }

    pub fn with_summoner_ownership(mut self, grant: bool) -> Self {
        self.grant_summoner_ownership = grant;
        self
    }

    pub fn with_dialogs(mut self, show_dialogs: bool) -> Self {
        self.show_dialogs = show_dialogs;
        self
    }

    /// Save configuration as pretty-printed JSON.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load configuration from JSON. Missing keys fall back to their defaults.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let config = EngineConfig::default();
        assert!(config.apply_limits);
        assert!(config.allow_defaulting);
        assert!(config.grant_summoner_ownership);
        assert!(config.show_dialogs);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"apply_limits": false}"#).unwrap();
        assert!(!config.apply_limits);
        assert!(config.show_dialogs);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("engine.json");

        let config = EngineConfig::new()
            .with_apply_limits(false)
            .with_dialogs(false);
        config.save_json(&path).await.expect("Save should succeed");

        let loaded = EngineConfig::load_json(&path)
            .await
            .expect("Load should succeed");
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = EngineConfig::load_json("/nonexistent/engine.json").await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
