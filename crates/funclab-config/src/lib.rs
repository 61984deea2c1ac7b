#![deny(unsafe_code)]

//! Configuration loading and validation for funclab.
//!
//! Loads TOML configuration files and validates them. [`LabConfig`] is the
//! central configuration structure; every field has a default, so an empty
//! file (or no file at all) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Smallest stack the sandbox is allowed to run with.
pub const MIN_STACK_BYTES: usize = 64 * 1024;

/// Accepted `logging.level` values.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Top-level configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// Resource ceilings for each execution sandbox.
    #[serde(default)]
    pub sandbox: SandboxSection,

    /// How outcomes are rendered.
    #[serde(default)]
    pub output: OutputSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings that only the host (CLI) applies.
    #[serde(default)]
    pub host: HostSection,
}

/// Sandbox resource ceilings.
///
/// These bound a single runtime; they are not timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    /// Heap limit per runtime in bytes.
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: usize,

    /// Maximum native stack per runtime in bytes.
    #[serde(default = "default_max_stack_bytes")]
    pub max_stack_bytes: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            memory_limit_bytes: default_memory_limit_bytes(),
            max_stack_bytes: default_max_stack_bytes(),
        }
    }
}

fn default_memory_limit_bytes() -> usize {
    64 * 1024 * 1024 // 64 MiB
}

fn default_max_stack_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

/// Outcome rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Characters of source kept when a function value is previewed.
    #[serde(default = "default_function_preview_chars")]
    pub function_preview_chars: usize,

    /// Console lines retained per execution; older lines are evicted first.
    #[serde(default = "default_console_capacity")]
    pub console_capacity: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            function_preview_chars: default_function_preview_chars(),
            console_capacity: default_console_capacity(),
        }
    }
}

fn default_function_preview_chars() -> usize {
    100
}

fn default_console_capacity() -> usize {
    200
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Host-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSection {
    /// Seconds before the host abandons an execution (0 = no timeout).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl HostSection {
    /// The configured timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

impl LabConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: LabConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.memory_limit_bytes == 0 {
            return Err(ConfigError::Validation(
                "sandbox.memory_limit_bytes must be non-zero".to_string(),
            ));
        }
        if self.sandbox.max_stack_bytes < MIN_STACK_BYTES {
            return Err(ConfigError::Validation(format!(
                "sandbox.max_stack_bytes must be at least {MIN_STACK_BYTES}, got {}",
                self.sandbox.max_stack_bytes
            )));
        }
        if self.output.function_preview_chars == 0 {
            return Err(ConfigError::Validation(
                "output.function_preview_chars must be non-zero".to_string(),
            ));
        }
        if self.output.console_capacity == 0 {
            return Err(ConfigError::Validation(
                "output.console_capacity must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LabConfig::default();
        assert_eq!(config.sandbox.memory_limit_bytes, 67_108_864);
        assert_eq!(config.sandbox.max_stack_bytes, 1_048_576);
        assert_eq!(config.output.function_preview_chars, 100);
        assert_eq!(config.output.console_capacity, 200);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.host.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = LabConfig::parse("").unwrap();
        assert_eq!(config.output.console_capacity, 200);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [sandbox]
            memory_limit_bytes = 16777216
            max_stack_bytes = 262144

            [output]
            function_preview_chars = 40
            console_capacity = 10

            [logging]
            level = "debug"

            [host]
            timeout_secs = 0
        "#;
        let config = LabConfig::parse(toml).unwrap();
        assert_eq!(config.sandbox.memory_limit_bytes, 16 * 1024 * 1024);
        assert_eq!(config.sandbox.max_stack_bytes, 256 * 1024);
        assert_eq!(config.output.function_preview_chars, 40);
        assert_eq!(config.output.console_capacity, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.host.timeout(), None);
    }

    #[test]
    fn test_host_timeout() {
        let config = LabConfig::default();
        assert_eq!(config.host.timeout(), Some(std::time::Duration::from_secs(30)));
    }

    #[test]
    fn test_validation_rejects_zero_memory() {
        let toml = r#"
            [sandbox]
            memory_limit_bytes = 0
        "#;
        assert!(LabConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_small_stack() {
        let toml = r#"
            [sandbox]
            max_stack_bytes = 1024
        "#;
        let err = LabConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("max_stack_bytes"));
    }

    #[test]
    fn test_validation_rejects_zero_preview() {
        let toml = r#"
            [output]
            function_preview_chars = 0
        "#;
        assert!(LabConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_console_capacity() {
        let toml = r#"
            [output]
            console_capacity = 0
        "#;
        assert!(LabConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_level() {
        let toml = r#"
            [logging]
            level = "verbose"
        "#;
        let err = LabConfig::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = LabConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = LabConfig::parse(&text).unwrap();
        assert_eq!(parsed.sandbox.max_stack_bytes, config.sandbox.max_stack_bytes);
        assert_eq!(parsed.host.timeout_secs, config.host.timeout_secs);
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("funclab.toml");
        tokio::fs::write(&path, b"[output]\nconsole_capacity = 5\n[host]\ntimeout_secs = 2\n")
            .await
            .unwrap();

        let config = LabConfig::load(&path).await.unwrap();
        assert_eq!(config.output.console_capacity, 5);
        assert_eq!(config.host.timeout_secs, 2);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = LabConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[")
            .await
            .unwrap();

        let result = LabConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // ── Error display ─────────────────────────────────────────────────

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
