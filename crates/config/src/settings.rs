//! Settings for warden itself
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! override_file = ".env"
//!
//! [binary]
//! cache_path = "/tmp/sbx"
//! url_template = "https://{arch}.example.com/s-box"
//!
//! [renewal]
//! endpoint = "https://panel.example.com/api/client/servers/abc/renew"
//! api_key = "ptlc_..."
//! period_secs = 21600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ConfigError;

/// Placeholder replaced by the architecture class in
/// [`BinarySettings::url_template`].
pub const ARCH_PLACEHOLDER: &str = "{arch}";

/// Root settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSettings {
    /// `.env`-style override file for the supervised process environment
    pub override_file: PathBuf,

    /// Binary acquisition
    pub binary: BinarySettings,

    /// Lease renewal
    pub renewal: RenewalSettings,

    /// Child process lifecycle
    pub process: ProcessSettings,

    /// Startup narration
    pub banner: BannerSettings,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            override_file: PathBuf::from(".env"),
            binary: BinarySettings::default(),
            renewal: RenewalSettings::default(),
            process: ProcessSettings::default(),
            banner: BannerSettings::default(),
        }
    }
}

/// Where the supervised binary comes from and where it is cached
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinarySettings {
    /// Cache location; the binary is downloaded only if this is absent
    pub cache_path: PathBuf,
    /// Download URL with an `{arch}` placeholder
    pub url_template: String,
    /// Upper bound on the whole download
    pub download_timeout_secs: u64,
}

impl Default for BinarySettings {
    fn default() -> Self {
        Self {
            cache_path: std::env::temp_dir().join("sbx"),
            url_template: "https://{arch}.ssss.nyc.mn/s-box".to_string(),
            download_timeout_secs: 300,
        }
    }
}

impl BinarySettings {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// The recurring keep-alive call
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenewalSettings {
    /// Renewal endpoint; renewal is disabled when unset
    pub endpoint: Option<String>,
    /// Bearer credential sent with every renewal
    pub api_key: Option<String>,
    pub user_agent: String,
    /// Delay before the first renewal after arming
    pub initial_delay_secs: u64,
    /// Interval between renewals
    pub period_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            user_agent: concat!("warden-renewal-guardian/", env!("CARGO_PKG_VERSION")).to_string(),
            initial_delay_secs: 10,
            period_secs: 6 * 3600,
            connect_timeout_secs: 10,
            read_timeout_secs: 10,
        }
    }
}

impl RenewalSettings {
    /// Whether both an endpoint and a credential are configured
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

// Keeps the credential out of logs.
impl std::fmt::Debug for RenewalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalSettings")
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .field("user_agent", &self.user_agent)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .field("period_secs", &self.period_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

/// Child process lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessSettings {
    /// How long a terminated child gets before it is force-killed
    pub shutdown_grace_secs: u64,
    /// Shut warden down when the child exits on its own
    pub exit_with_child: bool,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
            exit_with_child: false,
        }
    }
}

impl ProcessSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Startup narration printed after the guardian is armed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BannerSettings {
    /// Pause before the banner; 0 disables it
    pub delay_secs: u64,
}

impl Default for BannerSettings {
    fn default() -> Self {
        Self { delay_secs: 15 }
    }
}

impl BannerSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl SupervisorSettings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = Self::from_toml_str(&content).map_err(|e| ConfigError::SettingsParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check settings for values that would break the supervisor at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.binary.url_template.contains(ARCH_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                field: "binary.url_template",
                reason: format!("must contain the `{}` placeholder", ARCH_PLACEHOLDER),
            });
        }
        if self.binary.download_timeout_secs == 0 {
            return Err(invalid_zero("binary.download_timeout_secs"));
        }

        let renewal = &self.renewal;
        match (&renewal.endpoint, &renewal.api_key) {
            (Some(_), None) => {
                return Err(ConfigError::Invalid {
                    field: "renewal.api_key",
                    reason: "an endpoint is configured without a credential".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Invalid {
                    field: "renewal.endpoint",
                    reason: "a credential is configured without an endpoint".to_string(),
                })
            }
            _ => {}
        }
        if let Some(endpoint) = &renewal.endpoint {
            if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                return Err(ConfigError::Invalid {
                    field: "renewal.endpoint",
                    reason: format!("`{}` is not an http(s) URL", endpoint),
                });
            }
        }
        if renewal.period_secs == 0 {
            return Err(invalid_zero("renewal.period_secs"));
        }
        if renewal.connect_timeout_secs == 0 {
            return Err(invalid_zero("renewal.connect_timeout_secs"));
        }
        if renewal.read_timeout_secs == 0 {
            return Err(invalid_zero("renewal.read_timeout_secs"));
        }

        Ok(())
    }
}

fn invalid_zero(field: &'static str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: "must be greater than zero".to_string(),
    }
}
