//! Property tests for override precedence.

use std::collections::HashMap;

use proptest::prelude::*;
use tempfile::TempDir;
use warden_config::{default_value, ConfigResolver, ALLOWED_KEYS};

fn allowed_key() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ALLOWED_KEYS.to_vec())
}

fn plain_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9._-]{1,16}"
}

proptest! {
    #[test]
    fn override_file_beats_env_and_default(
        key in allowed_key(),
        env_value in plain_value(),
        file_value in plain_value(),
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, format!("{}={}\n", key, file_value)).unwrap();

        let env: HashMap<String, String> =
            [(key.to_string(), env_value)].into_iter().collect();
        let config = ConfigResolver::new(path)
            .with_env(move |k| env.get(k).cloned())
            .resolve()
            .unwrap();

        prop_assert_eq!(config.get(key), Some(file_value.as_str()));
    }

    #[test]
    fn env_only_beats_default(key in allowed_key(), env_value in plain_value()) {
        let dir = TempDir::new().unwrap();

        let env: HashMap<String, String> =
            [(key.to_string(), env_value.clone())].into_iter().collect();
        let config = ConfigResolver::new(dir.path().join("absent.env"))
            .with_env(move |k| env.get(k).cloned())
            .resolve()
            .unwrap();

        prop_assert_eq!(config.get(key), Some(env_value.as_str()));
        for other in ALLOWED_KEYS.iter().filter(|k| **k != key) {
            prop_assert_eq!(config.get(other), default_value(other));
        }
    }

    #[test]
    fn unknown_override_keys_never_appear(
        key in "[A-Z][A-Z_]{2,12}",
        value in plain_value(),
    ) {
        prop_assume!(!ALLOWED_KEYS.contains(&key.as_str()));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, format!("{key}={value}\nexport {key}=\"{value}\"\n")).unwrap();

        let config = ConfigResolver::new(path)
            .with_env(|_| None)
            .resolve()
            .unwrap();

        prop_assert!(!config.contains_key(&key));
        for (k, _) in config.iter() {
            prop_assert!(ALLOWED_KEYS.contains(&k));
        }
    }
}

#[test]
fn documented_example() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, "NAME=Test\nHY2_PORT=\"25585\"  # comment\nFOO=bar\n").unwrap();

    let config = ConfigResolver::new(path)
        .with_env(|_| None)
        .resolve()
        .unwrap();

    assert_eq!(config.get("NAME"), Some("Test"));
    assert_eq!(config.get("HY2_PORT"), Some("25585"));
    assert!(!config.contains_key("FOO"));
}
