//! Warden configuration
//!
//! Two independent configuration surfaces live here:
//!
//! - [`EffectiveConfig`] is the environment handed to the supervised binary.
//!   It is built by [`ConfigResolver`] from built-in defaults, the process
//!   environment and an optional `.env`-style override file, restricted to a
//!   fixed allow-list of keys ([`ALLOWED_KEYS`]).
//! - [`SupervisorSettings`] controls warden itself: where the binary is
//!   cached, where renewals are sent, and how long shutdown may take.
//!
//! # Example
//!
//! ```ignore
//! use warden_config::ConfigResolver;
//!
//! let config = ConfigResolver::new(".env").resolve()?;
//! assert_eq!(config.get("FILE_PATH"), Some("./world"));
//! ```

mod env_file;
mod errors;
mod keys;
mod resolver;
mod settings;

pub use env_file::{parse_override_file, parse_override_line};
pub use errors::ConfigError;
pub use keys::{default_value, is_allowed, ALLOWED_KEYS, DEFAULTS};
pub use resolver::{ConfigResolver, EffectiveConfig, EnvSource};
pub use settings::{
    BannerSettings, BinarySettings, ProcessSettings, RenewalSettings, SupervisorSettings,
    ARCH_PLACEHOLDER,
};
