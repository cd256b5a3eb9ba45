//! Fatal startup errors.
//!
//! Anything in this enum aborts startup before the supervised child or the
//! renewal guardian is running. Renewal failures are never errors; see
//! [`crate::renewal::RenewalOutcome`].

use thiserror::Error;
use warden_config::ConfigError;

use crate::process::ProcessError;
use crate::provision::ProvisionError;

/// Errors that stop warden during startup
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration could not be resolved
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The supervised binary could not be acquired
    #[error("binary provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// The supervised binary could not be started
    #[error("failed to launch supervised process: {0}")]
    Launch(#[from] ProcessError),

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Shutdown began before startup finished
    #[error("startup interrupted by shutdown")]
    Interrupted,
}
