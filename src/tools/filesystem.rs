//! [`Filesystem`] backed by the real filesystem.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;

use super::Filesystem;
use crate::error::{Error, Result};
use crate::util::file_exists;

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFilesystem;

impl HostFilesystem {
    /// Creates a handle to the host filesystem.
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for HostFilesystem {
    fn exists(&self, path: &Path) -> bool {
        file_exists(&path.to_string_lossy())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        debug!("    cp {} {}", from.display(), to.display());
        if from == to {
            return Ok(());
        }
        // Write through a fresh inode so a signed original is never modified in place.
        if to.exists() {
            fs::remove_file(to).map_err(|e| {
                Error::mutation(format!("rm {}", to.display()), e.to_string())
            })?;
        }
        fs::copy(from, to).map_err(|e| {
            Error::mutation(
                format!("cp {} {}", from.display(), to.display()),
                e.to_string(),
            )
        })?;
        self.make_writable(to)
    }

    fn make_writable(&self, path: &Path) -> Result<()> {
        let command = || format!("chmod +w {}", path.display());
        let mut permissions = fs::metadata(path)
            .map_err(|e| Error::mutation(command(), e.to_string()))?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o200);
        fs::set_permissions(path, permissions)
            .map_err(|e| Error::mutation(command(), e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        debug!("    mkdir -p {}", path.display());
        fs::create_dir_all(path)
            .map_err(|e| Error::mutation(format!("mkdir -p {}", path.display()), e.to_string()))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        debug!("    rm -r {}", path.display());
        fs::remove_dir_all(path)
            .map_err(|e| Error::mutation(format!("rm -r {}", path.display()), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        HostFilesystem.copy(&from, &to).unwrap();
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }

    #[test]
    fn test_copy_of_read_only_file_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("libRO.dylib");
        let to = dir.path().join("copy.dylib");
        fs::write(&from, b"lib").unwrap();
        fs::set_permissions(&from, fs::Permissions::from_mode(0o444)).unwrap();

        HostFilesystem.copy(&from, &to).unwrap();
        assert_eq!(fs::metadata(&to).unwrap().permissions().mode() & 0o200, 0o200);
    }

    #[test]
    fn test_copy_onto_itself_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, b"data").unwrap();

        HostFilesystem.copy(&file, &file).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"data");
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = HostFilesystem
            .copy(&dir.path().join("missing"), &dir.path().join("b"))
            .unwrap_err();
        assert!(matches!(err, Error::MutationFailure { .. }));
    }

    #[test]
    fn test_make_writable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, b"").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();

        HostFilesystem.make_writable(&file).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x/y/z");
        let fs_ = HostFilesystem::new();

        fs_.create_dir_all(&nested).unwrap();
        assert!(fs_.exists(&nested));
        fs_.remove_dir_all(&dir.path().join("x")).unwrap();
        assert!(!fs_.exists(&nested));
    }
}
