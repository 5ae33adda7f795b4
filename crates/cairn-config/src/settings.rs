//! Debugger settings files (cairn.toml, ~/.cairn/config.toml)
//!
//! Both files share one format. Every field is optional so that a project
//! file only has to mention what it overrides.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A parsed settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Backtrace policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<BacktraceConfig>,

    /// Language selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageConfig>,
}

/// `[backtrace]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BacktraceConfig {
    /// Continue unwinding past `main` (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub past_main: Option<bool>,

    /// Upper bound on the number of backtrace levels (0 = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// `[language]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LanguageConfig {
    /// "auto" or "manual"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl DebuggerConfig {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the settings
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(mode) = self.language.as_ref().and_then(|l| l.mode.as_deref()) {
            mode.parse::<LanguageMode>()?;
        }
        Ok(())
    }

    /// Merge another config into this one.
    /// Fields set in `other` take precedence.
    pub fn merge(&mut self, other: &DebuggerConfig) {
        if let Some(theirs) = &other.backtrace {
            let ours = self.backtrace.get_or_insert_with(Default::default);
            if theirs.past_main.is_some() {
                ours.past_main = theirs.past_main;
            }
            if theirs.limit.is_some() {
                ours.limit = theirs.limit;
            }
        }
        if let Some(theirs) = &other.language {
            let ours = self.language.get_or_insert_with(Default::default);
            if theirs.mode.is_some() {
                ours.mode = theirs.mode.clone();
            }
        }
    }

    /// Effective backtrace policy
    pub fn backtrace_settings(&self) -> BacktraceSettings {
        let section = self.backtrace.clone().unwrap_or_default();
        BacktraceSettings::default()
            .with_past_main(section.past_main.unwrap_or(false))
            .with_limit(section.limit)
    }

    /// Effective language mode (unparseable values were rejected by `validate`)
    pub fn language_mode(&self) -> LanguageMode {
        self.language
            .as_ref()
            .and_then(|l| l.mode.as_deref())
            .and_then(|m| m.parse().ok())
            .unwrap_or_default()
    }
}

// ── BacktraceSettings ────────────────────────────────────────────────────────

/// Policy applied when unwinding outward from a frame.
///
/// `past_main == false` (the default) stops a backtrace at `main`: its
/// caller is normally startup code nobody wants to see. `limit` bounds the
/// level a frame may have before asking for its caller is refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BacktraceSettings {
    /// Continue unwinding past `main`.
    pub past_main: bool,
    /// Maximum backtrace depth; `None` is unlimited.
    pub limit: Option<u32>,
}

impl BacktraceSettings {
    /// Settings that stop at `main` and never limit depth.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether unwinding continues past `main`.
    pub fn with_past_main(mut self, past_main: bool) -> Self {
        self.past_main = past_main;
        self
    }

    /// Set the depth limit. `Some(0)` means unlimited, as on the command line.
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit.filter(|&l| l > 0);
        self
    }

    /// Returns true if backtraces stop at `main`.
    pub fn stop_at_main(&self) -> bool {
        !self.past_main
    }
}

// ── LanguageMode ─────────────────────────────────────────────────────────────

/// Whether selecting a frame switches the current language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguageMode {
    /// Follow the language of the selected frame.
    #[default]
    Auto,
    /// Keep whatever language the user set.
    Manual,
}

impl FromStr for LanguageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(LanguageMode::Auto),
            "manual" => Ok(LanguageMode::Manual),
            other => Err(ConfigError::InvalidValue {
                field: "language.mode".to_string(),
                reason: format!("must be 'auto' or 'manual', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageMode::Auto => f.write_str("auto"),
            LanguageMode::Manual => f.write_str("manual"),
        }
    }
}
