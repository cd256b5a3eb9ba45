//! Host architecture detection and download URL mapping.

use std::fmt;

use warden_config::ARCH_PLACEHOLDER;

use super::error::ProvisionError;

/// Architecture classes that have a published binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Amd64,
    Arm64,
    S390x,
}

impl Architecture {
    /// Detect the architecture of the running host
    pub fn host() -> Result<Self, ProvisionError> {
        Self::from_identifier(std::env::consts::ARCH)
    }

    /// Classify an architecture identifier
    ///
    /// Accepts the common spellings (`x86_64`/`amd64`, `aarch64`/`arm64`,
    /// `s390x`) case-insensitively, including identifiers that merely
    /// contain them.
    pub fn from_identifier(identifier: &str) -> Result<Self, ProvisionError> {
        let id = identifier.to_ascii_lowercase();

        if id.contains("amd64") || id.contains("x86_64") {
            Ok(Self::Amd64)
        } else if id.contains("aarch64") || id.contains("arm64") {
            Ok(Self::Arm64)
        } else if id.contains("s390x") {
            Ok(Self::S390x)
        } else {
            Err(ProvisionError::UnsupportedPlatform(identifier.to_string()))
        }
    }

    /// Short name used in download URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::S390x => "s390x",
        }
    }

    /// Expand a URL template for this architecture
    pub fn download_url(&self, template: &str) -> String {
        template.replace(ARCH_PLACEHOLDER, self.as_str())
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_identifiers() {
        assert_eq!(Architecture::from_identifier("x86_64").unwrap(), Architecture::Amd64);
        assert_eq!(Architecture::from_identifier("amd64").unwrap(), Architecture::Amd64);
        assert_eq!(Architecture::from_identifier("AMD64").unwrap(), Architecture::Amd64);
        assert_eq!(Architecture::from_identifier("aarch64").unwrap(), Architecture::Arm64);
        assert_eq!(Architecture::from_identifier("arm64").unwrap(), Architecture::Arm64);
        assert_eq!(Architecture::from_identifier("s390x").unwrap(), Architecture::S390x);
    }

    #[test]
    fn test_unsupported_identifiers() {
        for id in ["x86", "arm", "riscv64", "powerpc64", "mips", ""] {
            let err = Architecture::from_identifier(id).unwrap_err();
            assert!(
                matches!(err, ProvisionError::UnsupportedPlatform(ref a) if a == id),
                "{id} should be unsupported"
            );
        }
    }

    #[test]
    fn test_distinct_download_urls() {
        let template = "https://{arch}.example.com/s-box";
        let urls: Vec<String> = [Architecture::Amd64, Architecture::Arm64, Architecture::S390x]
            .iter()
            .map(|a| a.download_url(template))
            .collect();

        assert_eq!(urls[0], "https://amd64.example.com/s-box");
        assert_eq!(urls[1], "https://arm64.example.com/s-box");
        assert_eq!(urls[2], "https://s390x.example.com/s-box");
    }
}
