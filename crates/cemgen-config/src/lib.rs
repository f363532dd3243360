//! cemgen Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.cemgen/config.toml`
//! - Local config: `.cemgen/config.toml` (in the project)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for cemgen.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CemConfig {
    /// Manifest generation configuration
    pub generate: GenerateConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Manifest generation configuration.
///
/// # Example TOML
///
/// ```toml
/// [generate]
/// files = ["src/**/*.ts"]
/// exclude = ["**/*.test.ts"]
/// output = "custom-elements.json"
/// incremental_threshold = 3
///
/// [generate.demo_discovery]
/// file_glob = "demos/**/*.html"
///
/// [generate.design_tokens]
/// spec = "design-tokens.json"
/// prefix = "acme"
///
/// [generate.watch]
/// debounce_ms = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerateConfig {
    /// Input glob patterns
    pub files: Vec<String>,

    /// Exclusion glob patterns
    pub exclude: Vec<String>,

    /// Output path for the manifest (relative to the project root).
    /// Falls back to the package manifest's `customElements` field.
    pub output: Option<String>,

    /// Affected-module count beyond which an incremental rebuild falls
    /// back to a full generation
    pub incremental_threshold: usize,

    /// Demo discovery settings
    pub demo_discovery: DemoDiscoveryConfig,

    /// Design token settings
    pub design_tokens: DesignTokensConfig,

    /// Watch mode settings
    pub watch: WatchConfig,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            files: vec!["src/**/*.ts".to_string(), "src/**/*.js".to_string()],
            exclude: Vec::new(),
            output: None,
            incremental_threshold: 3,
            demo_discovery: DemoDiscoveryConfig::default(),
            design_tokens: DesignTokensConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

/// Demo discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DemoDiscoveryConfig {
    /// Glob matching demo files
    pub file_glob: Option<String>,
}

/// Design token settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DesignTokensConfig {
    /// Path to the token spec file (relative to the project root)
    pub spec: Option<String>,

    /// Token name prefix applied during the merge
    pub prefix: Option<String>,
}

/// Watch mode settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce interval in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the project root directory
    pub project_root: Option<PathBuf>,

    /// Override the output path
    pub output: Option<String>,

    /// Override the input globs
    pub files: Option<Vec<String>>,

    /// Override the log level
    pub log_level: Option<String>,

    /// Verbose output
    pub verbose: bool,
}

impl CemConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref output) = overrides.output {
            self.generate.output = Some(output.clone());
        }
        if let Some(ref files) = overrides.files {
            self.generate.files = files.clone();
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generate.files.is_empty() {
            return Err(ConfigError::ValidationError(
                "generate.files must list at least one glob".to_string(),
            ));
        }
        if self.generate.incremental_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "generate.incremental_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = CemConfig::default();
        assert_eq!(config.generate.incremental_threshold, 3);
        assert_eq!(config.generate.watch.debounce_ms, 100);
        assert_eq!(config.logging.level, "info");
        assert!(config.generate.output.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = CemConfig::default();
        let overrides = ConfigOverrides {
            output: Some("dist/cem.json".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_overrides(&overrides);
        assert_eq!(config.generate.output.as_deref(), Some("dist/cem.json"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_empty_files() {
        let mut config = CemConfig::default();
        config.generate.files.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = CemConfig::default();
        config.generate.files = vec!["lib/**/*.ts".to_string()];
        config.generate.demo_discovery.file_glob = Some("demos/**/*.html".to_string());
        config.generate.design_tokens.spec = Some("tokens.json".to_string());
        config.generate.design_tokens.prefix = Some("acme".to_string());

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CemConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: CemConfig = toml::from_str("[generate]\nfiles = [\"x/*.ts\"]\n").unwrap();
        assert_eq!(parsed.generate.files, vec!["x/*.ts"]);
        assert_eq!(parsed.generate.incremental_threshold, 3);
        assert_eq!(parsed.logging.level, "info");
    }
}
