//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.cemgen/config.toml`
//! 2. Local config: `.cemgen/config.toml` (in the project)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{CemConfig, ConfigOverrides};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name, global and local.
const CONFIG_DIR: &str = ".cemgen";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.cemgen`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<CemConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.cemgen`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(CONFIG_DIR));
        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a project.
    pub fn local_config_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a project with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(
        &mut self,
        project_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<CemConfig, ConfigError> {
        let mut config = CemConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = global_config;
        }

        if let Some(local_config) = self.load_local(project_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<CemConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("no home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());
        Ok(Some(config))
    }

    /// Load only the local configuration for a project.
    pub fn load_local(&self, project_root: &Path) -> Result<Option<CemConfig>, ConfigError> {
        let local_path = self.local_config_path(project_root);

        if !local_path.exists() {
            trace!("local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the local config file for a project.
    pub fn save_local(
        &self,
        project_root: &Path,
        config: &CemConfig,
    ) -> Result<PathBuf, ConfigError> {
        let local_path = self.local_config_path(project_root);
        save_config_file(&local_path, config)?;
        Ok(local_path)
    }
}

/// Merge two configs: fields explicitly present in `overlay` win.
///
/// TOML has no "unset" marker for scalars with defaults, so the merge is
/// section-wise: a section in the overlay replaces the base section.
fn merge_configs(base: CemConfig, overlay: CemConfig) -> CemConfig {
    let defaults = CemConfig::default();
    let mut merged = base;

    if overlay.generate != defaults.generate {
        merged.generate = overlay.generate;
    }
    if overlay.logging != defaults.logging {
        merged.logging = overlay.logging;
    }
    merged
}

fn load_config_file(path: &Path) -> Result<CemConfig, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

fn save_config_file(path: &Path, config: &CemConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::write_file(parent, e))?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}
