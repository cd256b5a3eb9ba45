//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving configuration.
///
/// Malformed override lines are not errors; they are skipped.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The override file exists but could not be read
    #[error("failed to read override file {path}: {source}")]
    OverrideFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file could not be read
    #[error("failed to read settings file {path}: {source}")]
    SettingsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`crate::SupervisorSettings`]
    #[error("failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting has an unusable value
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
