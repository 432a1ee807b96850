#![forbid(unsafe_code)]

//! Session configuration.
//!
//! Every tunable of a layer session lives in one [`SessionConfig`] that can
//! be loaded from TOML or JSON (with the `config` feature). Missing sections
//! and fields take their defaults, so an empty document is a valid config.
//!
//! ```toml
//! # strata.toml
//! [naming]
//! suffix_start = 2
//! fallback_name = "layer"
//!
//! [drag]
//! copy_modifier = "shift"
//! move_modifier = "ctrl"
//!
//! [logging]
//! filter = "strata=debug"
//! ```
//!
//! ```rust,ignore
//! let config = SessionConfig::from_toml_file("strata.toml")?.validated()?;
//! ```

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use strata_core::Modifiers;

use crate::validation::DEFAULT_PROBING_MESSAGE;

/// Highest number of numeric layer shortcuts (`1`..=`9`).
pub const MAX_SHORTCUTS: usize = 9;

/// Top-level configuration of a layer session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct SessionConfig {
    pub naming: NamingConfig,
    pub shortcuts: ShortcutConfig,
    pub drag: DragConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
}

impl SessionConfig {
    /// Load from a TOML string.
    #[cfg(feature = "config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        tracing::debug!(
            target: "strata.config",
            path = %path.as_ref().display(),
            "loading session config"
        );
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        tracing::debug!(
            target: "strata.config",
            path = %path.as_ref().display(),
            "loading session config"
        );
        Self::from_json_str(&content)
    }

    /// Serialize to a TOML string.
    #[cfg(feature = "config")]
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::TomlSer)
    }

    /// Check every parameter is within range.
    ///
    /// Returns a list of problems. An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.naming.suffix_start < 2 {
            errors.push(format!(
                "naming.suffix_start must be >= 2, got {}",
                self.naming.suffix_start
            ));
        }
        if self.naming.fallback_name.trim().is_empty() {
            errors.push("naming.fallback_name must not be empty".into());
        }

        if self.shortcuts.count == 0 || self.shortcuts.count > MAX_SHORTCUTS {
            errors.push(format!(
                "shortcuts.count must be in 1..={MAX_SHORTCUTS}, got {}",
                self.shortcuts.count
            ));
        }

        if self.drag.copy_modifier == self.drag.move_modifier {
            errors.push(format!(
                "drag.copy_modifier and drag.move_modifier must differ, both are {}",
                self.drag.copy_modifier.as_str()
            ));
        }

        if self.validation.probing_message.is_empty() {
            errors.push("validation.probing_message must not be empty".into());
        }

        if self.logging.filter.trim().is_empty() {
            errors.push("logging.filter must not be empty".into());
        }

        errors
    }

    /// Return `self` if [`validate`](Self::validate) finds no problems.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            tracing::warn!(
                target: "strata.config",
                problems = errors.len(),
                "invalid session config"
            );
            Err(ConfigError::Invalid(errors))
        }
    }
}

/// Layer naming.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct NamingConfig {
    /// First numeric suffix tried for a taken name: `base (2)`.
    pub suffix_start: u32,
    /// Name used when no name can be suggested for a source.
    pub fallback_name: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            suffix_start: 2,
            fallback_name: "layer".into(),
        }
    }
}

/// Numeric layer shortcuts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ShortcutConfig {
    /// Number of `toggle-layer-N` / `select-layer-N` actions bound.
    pub count: usize,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            count: MAX_SHORTCUTS,
        }
    }
}

/// Modifier key named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
pub enum ModifierKey {
    Shift,
    #[cfg_attr(feature = "config", serde(alias = "control"))]
    Ctrl,
    Alt,
    #[cfg_attr(feature = "config", serde(alias = "meta"))]
    Super,
}

impl ModifierKey {
    /// The matching modifier flag.
    #[must_use]
    pub const fn modifiers(self) -> Modifiers {
        match self {
            Self::Shift => Modifiers::SHIFT,
            Self::Ctrl => Modifiers::CTRL,
            Self::Alt => Modifiers::ALT,
            Self::Super => Modifiers::SUPER,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shift => "shift",
            Self::Ctrl => "ctrl",
            Self::Alt => "alt",
            Self::Super => "super",
        }
    }
}

/// Drag method keys.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct DragConfig {
    /// Held to force a copy.
    pub copy_modifier: ModifierKey,
    /// Held to force a move.
    pub move_modifier: ModifierKey,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            copy_modifier: ModifierKey::Shift,
            move_modifier: ModifierKey::Ctrl,
        }
    }
}

/// Source validation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ValidationConfig {
    /// Status text while a probe is in flight.
    pub probing_message: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            probing_message: DEFAULT_PROBING_MESSAGE.into(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `STRATA_LOG` overrides it.
    pub filter: String,
    /// Emit JSON lines (needs the `tracing-json` feature).
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

/// Errors from loading or validating a config.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config")]
    Toml(toml::de::Error),
    /// TOML serialization error.
    #[cfg(feature = "config")]
    TomlSer(toml::ser::Error),
    /// JSON parse error.
    #[cfg(feature = "config")]
    Json(serde_json::Error),
    /// The config parsed but is out of range.
    Invalid(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            #[cfg(feature = "config")]
            Self::TomlSer(e) => write!(f, "TOML serialize error: {e}"),
            #[cfg(feature = "config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Invalid(errors) => write!(f, "invalid config: {}", errors.join("; ")),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "config")]
            Self::TomlSer(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Json(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}
