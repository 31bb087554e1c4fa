//! Conversion settings.
//!
//! Settings are layered, each layer overriding only the fields it sets:
//! built-in defaults, the user file at
//! `<config_dir>/pixconv/config.toml`, an explicit `--config` file, then
//! command-line flags. Every layer is a [`ConfigOverlay`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::drift::DEFAULT_TOLERANCE;
use crate::error::ErrorCode;
use crate::lock::DEFAULT_LOCK_TIMEOUT;
use crate::store::WriteMode;

/// Plane namespace used when none is given.
pub const DEFAULT_PLANE: &str = "Plane0";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Invalid(_) => ErrorCode::ConfigInvalid,
        }
    }
}

/// Fully resolved settings for one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Hit table to read.
    pub input: PathBuf,
    /// Output store directory.
    pub output: PathBuf,
    /// Namespace of this plane inside the store.
    #[serde(default = "default_plane")]
    pub plane: String,
    #[serde(default)]
    pub write_mode: WriteMode,
    /// Author the Event table (`true`) or verify against it (`false`).
    #[serde(default = "default_true")]
    pub author_mode: bool,
    /// Stop after this many events; 0 means no limit.
    #[serde(default)]
    pub max_events: u64,
    #[serde(default)]
    pub check_timestamp: bool,
    #[serde(default = "default_tolerance")]
    pub timestamp_tolerance: f64,
    #[serde(default = "default_true")]
    pub require_monotonic: bool,
    /// Write the optional diagnostic columns.
    #[serde(default)]
    pub diagnostics: bool,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            plane: default_plane(),
            write_mode: WriteMode::default(),
            author_mode: default_true(),
            max_events: 0,
            check_timestamp: false,
            timestamp_tolerance: default_tolerance(),
            require_monotonic: default_true(),
            diagnostics: false,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl ConvertConfig {
    /// Reject settings that cannot describe a conversion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("no input hit table given".into()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("no output store given".into()));
        }
        validate_plane(&self.plane)?;
        if !self.timestamp_tolerance.is_finite() || self.timestamp_tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "timestamp tolerance must be a finite, non-negative number, got {}",
                self.timestamp_tolerance
            )));
        }
        Ok(())
    }

    /// The event limit, `None` when unbounded.
    #[must_use]
    pub const fn event_limit(&self) -> Option<u64> {
        if self.max_events == 0 {
            None
        } else {
            Some(self.max_events)
        }
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Apply every field `overlay` sets.
    #[must_use]
    pub fn apply(mut self, overlay: ConfigOverlay) -> Self {
        let ConfigOverlay {
            input,
            output,
            plane,
            write_mode,
            author_mode,
            max_events,
            check_timestamp,
            timestamp_tolerance,
            require_monotonic,
            diagnostics,
            lock_timeout_ms,
        } = overlay;
        if let Some(v) = input {
            self.input = v;
        }
        if let Some(v) = output {
            self.output = v;
        }
        if let Some(v) = plane {
            self.plane = v;
        }
        if let Some(v) = write_mode {
            self.write_mode = v;
        }
        if let Some(v) = author_mode {
            self.author_mode = v;
        }
        if let Some(v) = max_events {
            self.max_events = v;
        }
        if let Some(v) = check_timestamp {
            self.check_timestamp = v;
        }
        if let Some(v) = timestamp_tolerance {
            self.timestamp_tolerance = v;
        }
        if let Some(v) = require_monotonic {
            self.require_monotonic = v;
        }
        if let Some(v) = diagnostics {
            self.diagnostics = v;
        }
        if let Some(v) = lock_timeout_ms {
            self.lock_timeout_ms = v;
        }
        self
    }
}

fn validate_plane(plane: &str) -> Result<(), ConfigError> {
    if plane.trim().is_empty() {
        return Err(ConfigError::Invalid("plane name is empty".into()));
    }
    if plane == "." || plane == ".." || plane.contains(['/', '\\']) {
        return Err(ConfigError::Invalid(format!(
            "plane name `{plane}` must be a single path component"
        )));
    }
    Ok(())
}

/// One settings layer. Unset fields leave the layer below untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub plane: Option<String>,
    pub write_mode: Option<WriteMode>,
    pub author_mode: Option<bool>,
    pub max_events: Option<u64>,
    pub check_timestamp: Option<bool>,
    pub timestamp_tolerance: Option<f64>,
    pub require_monotonic: Option<bool>,
    pub diagnostics: Option<bool>,
    pub lock_timeout_ms: Option<u64>,
}

/// Parse a settings layer from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load_overlay(path: &Path) -> Result<ConfigOverlay, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Location of the per-user settings file, if the platform has one.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pixconv/config.toml"))
}

/// Load the per-user settings layer. A missing file is an empty layer.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> anyhow::Result<ConfigOverlay> {
    let Some(path) = user_config_path() else {
        return Ok(ConfigOverlay::default());
    };
    if !path.exists() {
        return Ok(ConfigOverlay::default());
    }
    load_overlay(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Resolve the full settings stack. `file` is the explicit `--config`
/// layer, `flags` the command line.
///
/// # Errors
///
/// Returns an error if a settings file is unreadable or the result fails
/// [`ConvertConfig::validate`].
pub fn resolve_config(file: Option<&Path>, flags: ConfigOverlay) -> anyhow::Result<ConvertConfig> {
    let mut config = ConvertConfig::default().apply(load_user_config()?);
    if let Some(path) = file {
        config = config.apply(load_overlay(path)?);
    }
    let config = config.apply(flags);
    config.validate()?;
    Ok(config)
}

const fn default_true() -> bool {
    true
}

fn default_plane() -> String {
    DEFAULT_PLANE.to_string()
}

const fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

#[allow(clippy::cast_possible_truncation)]
const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}
