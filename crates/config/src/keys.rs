//! The allow-list of keys passed to the supervised binary.

/// Every key warden recognizes. Keys outside this list are ignored in the
/// process environment and in the override file alike.
pub const ALLOWED_KEYS: &[&str] = &[
    "PORT",
    "FILE_PATH",
    "UUID",
    "NEZHA_SERVER",
    "NEZHA_PORT",
    "NEZHA_KEY",
    "ARGO_PORT",
    "ARGO_DOMAIN",
    "ARGO_AUTH",
    "HY2_PORT",
    "TUIC_PORT",
    "REALITY_PORT",
    "CFIP",
    "CFPORT",
    "UPLOAD_URL",
    "CHAT_ID",
    "BOT_TOKEN",
    "NAME",
];

/// Built-in defaults, the lowest-precedence layer.
///
/// `PORT` is allow-listed but has no default.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("UUID", "e95c61f3-7dfd-42ac-87b5-2964c503b7a7"),
    ("FILE_PATH", "./world"),
    ("NEZHA_SERVER", ""),
    ("NEZHA_PORT", ""),
    ("NEZHA_KEY", ""),
    ("ARGO_PORT", ""),
    ("ARGO_DOMAIN", ""),
    ("ARGO_AUTH", ""),
    ("HY2_PORT", "25585"),
    ("TUIC_PORT", ""),
    ("REALITY_PORT", ""),
    ("UPLOAD_URL", ""),
    ("CHAT_ID", ""),
    ("BOT_TOKEN", ""),
    ("CFIP", "cf.877774.xyz"),
    ("CFPORT", "443"),
    ("NAME", "Mc"),
];

/// Check whether a key is on the allow-list
pub fn is_allowed(key: &str) -> bool {
    ALLOWED_KEYS.contains(&key)
}

/// Look up the built-in default for a key
pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}
