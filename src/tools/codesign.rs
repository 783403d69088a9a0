//! Ad-hoc re-signing with Apple's `codesign`.

use std::fs;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::warn;

use super::{run_tool, Signer};
use crate::error::{Error, Result};

/// Name of the signing tool.
pub const CODESIGN: &str = "codesign";

/// Arguments placed before the file name.
pub const CODESIGN_ARGS: &[&str] = &[
    "--force",
    "--deep",
    "--preserve-metadata=entitlements,requirements,flags,runtime",
    "--sign",
    "-",
];

/// [`Signer`] backed by `codesign`.
///
/// A failed signature is retried once on a fresh copy of the file, which
/// clears the stale signature the kernel may have cached for the old inode.
#[derive(Debug, Clone)]
pub struct Codesign {
    program: String,
}

impl Default for Codesign {
    fn default() -> Self {
        Self {
            program: CODESIGN.to_string(),
        }
    }
}

impl Codesign {
    /// Uses the `codesign` found on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific `codesign` binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn sign_once(&self, file: &Path) -> Result<()> {
        let file = file.to_string_lossy();
        let args: Vec<&str> = CODESIGN_ARGS
            .iter()
            .copied()
            .chain(std::iter::once(&*file))
            .collect();
        run_tool(&self.program, &args)
    }
}

/// Replaces `file` with a byte-identical copy that has a new inode.
fn replace_with_copy(file: &Path) -> Result<()> {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(parent)?;
    fs::copy(file, temp.path())?;
    temp.persist(file).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl Signer for Codesign {
    fn sign(&self, file: &Path) -> Result<()> {
        let first = match self.sign_once(file) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        warn!("{first}; retrying on a fresh copy of {}", file.display());
        replace_with_copy(file).map_err(|e| {
            Error::mutation(
                format!("{} {}", self.program, file.display()),
                format!("could not recreate file for re-signing: {e}"),
            )
        })?;
        self.sign_once(file)
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn test_replace_with_copy_keeps_contents_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("libA.dylib");
        fs::write(&file, b"payload").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();

        replace_with_copy(&file).unwrap();

        assert_eq!(fs::read(&file).unwrap(), b"payload");
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o755);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failure_after_retry_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("libA.dylib");
        fs::write(&file, b"payload").unwrap();

        let err = Codesign::with_program("false").sign(&file).unwrap_err();
        assert!(matches!(err, Error::MutationFailure { .. }));
        assert_eq!(fs::read(&file).unwrap(), b"payload");
    }

    #[test]
    fn test_success_on_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("libA.dylib");
        fs::write(&file, b"payload").unwrap();

        assert!(Codesign::with_program("true").sign(&file).is_ok());
    }
}
