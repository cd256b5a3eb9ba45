//! Supervised binary acquisition
//!
//! Maps the host architecture to a download location, fetches the binary
//! into a cache path once, and marks it executable.
//!
//! # Architecture
//!
//! - [`Architecture`] - the closed set of supported CPU classes
//! - [`BinarySource`] - where bytes come from ([`HttpBinarySource`] in production)
//! - [`BinaryProvisioner`] - cache check, download and chmod
//!
//! The cache outlives a single run: once the file exists at the cache path it
//! is reused until someone deletes it.

mod arch;
mod error;
mod fetch;
mod install;

use std::path::{Path, PathBuf};

use tracing::info;
use warden_config::BinarySettings;

pub use arch::Architecture;
pub use error::ProvisionError;
pub use fetch::{BinarySource, HttpBinarySource};
pub use install::{ensure_executable, is_cached, mark_executable};

/// Ensures the supervised binary is present and executable
pub struct BinaryProvisioner<S = HttpBinarySource> {
    source: S,
    cache_path: PathBuf,
    url_template: String,
}

impl BinaryProvisioner<HttpBinarySource> {
    /// Create a provisioner that downloads over HTTP
    pub fn from_settings(settings: &BinarySettings) -> Result<Self, reqwest::Error> {
        let source = HttpBinarySource::new(settings.download_timeout())?;
        Ok(Self::with_source(
            source,
            settings.cache_path.clone(),
            settings.url_template.clone(),
        ))
    }
}

impl<S: BinarySource> BinaryProvisioner<S> {
    /// Create a provisioner with a custom source
    pub fn with_source(source: S, cache_path: PathBuf, url_template: String) -> Self {
        Self {
            source,
            cache_path,
            url_template,
        }
    }

    /// Cache location of the binary
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Download URL for an architecture
    pub fn download_url(&self, arch: Architecture) -> String {
        arch.download_url(&self.url_template)
    }

    /// Ensure the binary for the host architecture is available
    pub async fn ensure_binary(&self) -> Result<PathBuf, ProvisionError> {
        self.ensure_binary_for(std::env::consts::ARCH).await
    }

    /// Ensure the binary for a given architecture identifier is available
    ///
    /// The architecture is checked before anything else, so an unsupported
    /// identifier fails without touching the network or the cache.
    pub async fn ensure_binary_for(&self, arch_id: &str) -> Result<PathBuf, ProvisionError> {
        let arch = Architecture::from_identifier(arch_id)?;

        if is_cached(&self.cache_path) {
            info!(
                path = %self.cache_path.display(),
                arch = %arch,
                "Reusing cached binary"
            );
            ensure_executable(&self.cache_path)?;
            return Ok(self.cache_path.clone());
        }

        let url = self.download_url(arch);
        info!(
            url = %url,
            arch = %arch,
            dest = %self.cache_path.display(),
            "Downloading supervised binary"
        );

        self.source.fetch(&url, &self.cache_path).await?;
        mark_executable(&self.cache_path)?;

        Ok(self.cache_path.clone())
    }
}

impl<S> std::fmt::Debug for BinaryProvisioner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryProvisioner")
            .field("cache_path", &self.cache_path)
            .field("url_template", &self.url_template)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Source that writes a fixed body and counts calls
    #[derive(Clone, Default)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
        urls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BinarySource for CountingSource {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            std::fs::write(dest, b"#!/bin/sh\n")?;
            Ok(10)
        }
    }

    /// Source that always fails
    struct FailingSource;

    #[async_trait]
    impl BinarySource for FailingSource {
        async fn fetch(&self, url: &str, _dest: &Path) -> Result<u64, ProvisionError> {
            Err(ProvisionError::HttpStatus {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    fn provisioner(dir: &TempDir, source: CountingSource) -> BinaryProvisioner<CountingSource> {
        BinaryProvisioner::with_source(
            source,
            dir.path().join("sbx"),
            "https://{arch}.example.com/s-box".to_string(),
        )
    }

    #[tokio::test]
    async fn test_downloads_once_per_cache_lifetime() {
        let dir = TempDir::new().unwrap();
        let source = CountingSource::default();
        let provisioner = provisioner(&dir, source.clone());

        let first = provisioner.ensure_binary_for("x86_64").await.unwrap();
        let second = provisioner.ensure_binary_for("x86_64").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.urls.lock().unwrap().as_slice(),
            ["https://amd64.example.com/s-box".to_string()]
        );
    }

    #[tokio::test]
    async fn test_populated_cache_skips_download() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sbx"), b"cached").unwrap();
        let source = CountingSource::default();
        let provisioner = provisioner(&dir, source.clone());

        for arch in ["aarch64", "s390x", "amd64"] {
            provisioner.ensure_binary_for(arch).await.unwrap();
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(dir.path().join("sbx")).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_unsupported_platform_makes_no_call() {
        let dir = TempDir::new().unwrap();
        let source = CountingSource::default();
        let provisioner = provisioner(&dir, source.clone());

        let err = provisioner.ensure_binary_for("riscv64").await.unwrap_err();

        assert!(matches!(err, ProvisionError::UnsupportedPlatform(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("sbx").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_is_marked_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, CountingSource::default());

        let path = provisioner.ensure_binary_for("arm64").await.unwrap();

        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[tokio::test]
    async fn test_download_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let provisioner = BinaryProvisioner::with_source(
            FailingSource,
            dir.path().join("sbx"),
            "https://{arch}.example.com/s-box".to_string(),
        );

        let err = provisioner.ensure_binary_for("x86_64").await.unwrap_err();
        assert!(matches!(err, ProvisionError::HttpStatus { status: 503, .. }));
        assert!(!dir.path().join("sbx").exists());
    }
}
