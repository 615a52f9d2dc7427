//! Application configuration.

use crate::error::{AppError, AppResult};
use guard_api::ApiConfig;
use guard_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GUARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Audit JSON Lines sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSinkConfig {
    /// Write audit entries to disk in addition to memory.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Entries buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_data_dir() -> String {
    "data/audit".to_string()
}

fn default_prefix() -> String {
    "audit".to_string()
}

fn default_buffer_size() -> usize {
    100
}

impl Default for AuditSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: default_data_dir(),
            prefix: default_prefix(),
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub audit: AuditSinkConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    /// Load from `GUARD_CONFIG` or the default path, falling back to
    /// defaults when no file exists.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.engine
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if self.audit.enabled && self.audit.buffer_size == 0 {
            return Err(AppError::Config(
                "audit.buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::UserId;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.audit.enabled);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_engine_sections_at_top_level() {
        let config = AppConfig::parse(
            r#"
            [risk]
            default_equity = "20000"

            [[risk.users]]
            user_id = "alice"
            [risk.users.profile]
            daily_loss_limit_pct = "2.0"

            [kill_switch]
            reset_token = "op"

            [audit]
            enabled = true
            data_dir = "/tmp/guard-audit"

            [api]
            port = 9090
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.risk.default_equity, dec!(20000));
        assert_eq!(config.engine.risk.users[0].user_id, UserId::from("alice"));
        assert_eq!(
            config.engine.risk.users[0].profile.daily_loss_limit_pct,
            dec!(2.0)
        );
        assert_eq!(config.engine.kill_switch.reset_token.as_deref(), Some("op"));
        assert!(config.audit.enabled);
        assert_eq!(config.audit.prefix, "audit");
        assert_eq!(config.api.port, 9090);
    }

    #[test]
    fn test_invalid_engine_section_is_config_error() {
        let err = AppConfig::parse(
            r#"
            [kill_switch]
            reset_token = ""
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nenabled = false").unwrap();
        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert!(!config.api.enabled);

        assert!(matches!(
            AppConfig::from_file("/nonexistent/guard.toml"),
            Err(AppError::Config(_))
        ));
    }
}
