//! Error types for binary provisioning.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while acquiring the supervised binary
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Host CPU architecture has no download location
    #[error("unsupported architecture: {0}")]
    UnsupportedPlatform(String),

    /// The download request failed
    #[error("download from {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The download endpoint answered with a non-success status
    #[error("download from {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The executable bit could not be set on the cached binary
    #[error("failed to set executable permission on {path}: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error while writing the cache file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
