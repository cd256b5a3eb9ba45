//! Layered resolution of the supervised process environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::env_file::parse_override_file;
use crate::errors::ConfigError;
use crate::keys::{ALLOWED_KEYS, DEFAULTS};

/// Lookup function for the process environment layer.
pub type EnvSource = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The resolved environment for the supervised binary
///
/// Only allow-listed keys are ever present. Built once at startup and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveConfig {
    values: BTreeMap<String, String>,
}

impl EffectiveConfig {
    /// Get the value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of keys present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no keys are present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a EffectiveConfig {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Merges defaults, environment and override file into an [`EffectiveConfig`]
///
/// Precedence, lowest to highest:
///
/// 1. built-in [`DEFAULTS`]
/// 2. process environment, for allow-listed keys with a non-blank value
/// 3. the override file, for allow-listed keys
pub struct ConfigResolver {
    override_path: PathBuf,
    env: EnvSource,
}

impl ConfigResolver {
    /// Create a resolver reading the real process environment
    pub fn new(override_path: impl Into<PathBuf>) -> Self {
        Self {
            override_path: override_path.into(),
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment source
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Build the effective configuration
    ///
    /// # Errors
    ///
    /// A missing override file is fine. An override file that exists but
    /// cannot be read returns [`ConfigError::OverrideFile`].
    pub fn resolve(&self) -> Result<EffectiveConfig, ConfigError> {
        let mut values = BTreeMap::new();

        for (key, value) in DEFAULTS {
            values.insert((*key).to_string(), (*value).to_string());
        }

        let mut from_env = 0usize;
        for key in ALLOWED_KEYS {
            if let Some(value) = (self.env)(key) {
                if !value.trim().is_empty() {
                    trace!(key = %key, "Using value from environment");
                    values.insert((*key).to_string(), value);
                    from_env += 1;
                }
            }
        }

        let overrides = self.read_overrides()?;
        let from_file = overrides.len();
        for (key, value) in overrides {
            values.insert(key, value);
        }

        info!(
            keys = values.len(),
            from_env = from_env,
            from_override_file = from_file,
            override_file = %self.override_path.display(),
            "Resolved supervised process environment"
        );

        Ok(EffectiveConfig { values })
    }

    fn read_overrides(&self) -> Result<Vec<(String, String)>, ConfigError> {
        match std::fs::read_to_string(&self.override_path) {
            Ok(content) => Ok(parse_override_file(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    path = %self.override_path.display(),
                    "No override file found"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(ConfigError::OverrideFile {
                path: self.override_path.clone(),
                source: e,
            }),
        }
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("override_path", &self.override_path)
            .finish()
    }
}
