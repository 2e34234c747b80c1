//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn require_absolute_path(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::Invalid { field: field.into(), reason: format!("{value:?} must start with '/'") });
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_version` is blank
    /// - `origin` is not an absolute http(s) URL
    /// - any bypass prefix, core path or the shell path does not start with `/`
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.version()?;
        self.origin_url()?;

        for prefix in &self.bypass_prefixes {
            require_absolute_path("bypass_prefixes", prefix)?;
        }
        for path in &self.core_paths {
            require_absolute_path("core_paths", path)?;
        }
        require_absolute_path("shell_path", &self.shell_path)?;

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.bypass_prefixes.is_empty() {
            tracing::warn!("no bypass_prefixes configured; API requests will be cached like assets");
        }

        if !self.core_paths.contains(&self.shell_path) {
            tracing::warn!(
                shell_path = %self.shell_path,
                "shell_path is not among core_paths; navigations have no offline shell until one is fetched"
            );
        }

        Ok(())
    }
}
