//! Cache file handling
//!
//! Checks for a cached binary and sets the executable bit after download.

use std::path::Path;

use tracing::{debug, info};

use super::error::ProvisionError;

/// Whether a cached binary is present at `path`
pub fn is_cached(path: &Path) -> bool {
    path.is_file()
}

/// Set permissions (executable) on a downloaded binary
pub fn mark_executable(path: &Path) -> Result<(), ProvisionError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let permission_err = |source| ProvisionError::Permission {
            path: path.to_path_buf(),
            source,
        };

        let mut perms = std::fs::metadata(path).map_err(permission_err)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(permission_err)?;

        info!(path = %path.display(), "Marked binary executable");
    }

    #[cfg(not(unix))]
    {
        debug!(path = %path.display(), "No executable bit on this platform");
    }

    Ok(())
}

/// Make sure a cached binary is executable, fixing it if it is not
///
/// Covers a cache file left behind by an earlier run that failed between
/// download and chmod.
pub fn ensure_executable(path: &Path) -> Result<(), ProvisionError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & 0o111 == 0 {
            debug!(path = %path.display(), mode = format!("{:o}", mode), "Cached binary not executable");
            return mark_executable(path);
        }
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sbx");
        assert!(!is_cached(&path));

        std::fs::write(&path, b"bin").unwrap();
        assert!(is_cached(&path));

        // A directory is not a cached binary
        assert!(!is_cached(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_mark_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sbx");
        std::fs::write(&path, b"bin").unwrap();

        mark_executable(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_mark_executable_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = mark_executable(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ProvisionError::Permission { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_executable_repairs_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sbx");
        std::fs::write(&path, b"bin").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        ensure_executable(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }
}
