//! Binary download sources.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::error::ProvisionError;

/// Something that can place a binary at a local path
#[async_trait]
pub trait BinarySource: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written
    ///
    /// `dest` must either be left untouched or contain the complete binary.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError>;
}

/// Downloads binaries over HTTP(S)
///
/// The body is streamed into a temporary file next to `dest` and only
/// renamed over `dest` once the transfer completed.
#[derive(Debug, Clone)]
pub struct HttpBinarySource {
    client: reqwest::Client,
}

impl HttpBinarySource {
    /// Create a source whose downloads are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BinarySource for HttpBinarySource {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError> {
        let download_err = |source| ProvisionError::Download {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(download_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(dir).await?;
        let file = tempfile::NamedTempFile::new_in(dir)?;

        let mut out = tokio::fs::File::from_std(file.as_file().try_clone()?);
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(download_err)? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        // The write handle must be closed before the binary is executed.
        drop(out);

        debug!(
            temp = %file.path().display(),
            bytes = written,
            "Download complete, moving into place"
        );
        file.persist(dest).map_err(|e| ProvisionError::Io(e.error))?;

        info!(url = %url, dest = %dest.display(), bytes = written, "Binary downloaded");
        Ok(written)
    }
}
