//! Configuration Loader
//!
//! Handles loading and merging settings from multiple sources with proper precedence.

use crate::settings::{BacktraceConfig, DebuggerConfig, LanguageConfig, LanguageMode};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the per-project settings file
pub const PROJECT_CONFIG_FILE: &str = "cairn.toml";

/// Configuration loader
///
/// Loads settings from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.cairn/config.toml) - lowest priority
/// 2. Project config (nearest cairn.toml) - overrides global
/// 3. Environment variables (CAIRN_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from `path` instead of
    /// the home directory
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find cairn.toml, merges it over the
    /// global config, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<DebuggerConfig> {
        let mut config = self.load_global_config()?;
        if let Some(project) = Self::find_project_config(start_dir)? {
            config.merge(&project);
        }
        Self::apply_env_overrides(config)
    }

    /// Load configuration from a specific project file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<DebuggerConfig> {
        let mut config = self.load_global_config()?;
        config.merge(&DebuggerConfig::load_from_file(config_path)?);
        Self::apply_env_overrides(config)
    }

    /// Find the nearest project config by walking up the directory tree
    fn find_project_config(start_dir: &Path) -> ConfigResult<Option<DebuggerConfig>> {
        for dir in start_dir.ancestors() {
            let config_path = dir.join(PROJECT_CONFIG_FILE);
            if config_path.exists() {
                return DebuggerConfig::load_from_file(&config_path).map(Some);
            }
        }
        Ok(None)
    }

    /// Load global configuration; a missing file is an empty config
    fn load_global_config(&mut self) -> ConfigResult<DebuggerConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = Self::global_config_dir()?.join("config.toml");
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(DebuggerConfig::default());
        }

        DebuggerConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables follow the pattern: CAIRN_<SECTION>_<KEY>
    /// Example: CAIRN_BACKTRACE_LIMIT=32
    fn apply_env_overrides(mut config: DebuggerConfig) -> ConfigResult<DebuggerConfig> {
        if let Ok(past_main) = env::var("CAIRN_BACKTRACE_PAST_MAIN") {
            let past_main = parse_bool("CAIRN_BACKTRACE_PAST_MAIN", &past_main)?;
            config
                .backtrace
                .get_or_insert_with(BacktraceConfig::default)
                .past_main = Some(past_main);
        }

        if let Ok(limit) = env::var("CAIRN_BACKTRACE_LIMIT") {
            let limit = limit
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "CAIRN_BACKTRACE_LIMIT".to_string(),
                    reason: e.to_string(),
                })?;
            config
                .backtrace
                .get_or_insert_with(BacktraceConfig::default)
                .limit = Some(limit);
        }

        if let Ok(mode) = env::var("CAIRN_LANGUAGE_MODE") {
            let mode = mode.trim().to_lowercase().parse::<LanguageMode>()?;
            config
                .language
                .get_or_insert_with(LanguageConfig::default)
                .mode = Some(mode.to_string());
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.cairn)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".cairn"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}
