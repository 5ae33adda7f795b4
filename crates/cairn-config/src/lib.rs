//! Cairn Configuration System
//!
//! Provides the policy settings that sit on top of the frame cache:
//! - Whether backtraces continue past `main` (`[backtrace] past-main`)
//! - An upper bound on backtrace depth (`[backtrace] limit`)
//! - How the selected frame drives the current language (`[language] mode`)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.cairn/config.toml)
//! 2. Project config (nearest cairn.toml)
//! 3. Environment variables (CAIRN_*)
//!
//! # Example
//!
//! ```no_run
//! use cairn_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let settings = config.backtrace_settings();
//! assert!(settings.limit.map_or(true, |limit| limit > 0));
//! ```

pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::ConfigLoader;
pub use settings::{BacktraceConfig, BacktraceSettings, DebuggerConfig, LanguageConfig, LanguageMode};
