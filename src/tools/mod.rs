//! The external collaborators the bundler drives.
//!
//! The core only sees these traits; the host implementations read Mach-O
//! files natively and shell out to `install_name_tool` and `codesign`.

mod codesign;
mod command;
mod filesystem;
mod inspector;
mod install_name_tool;

pub use codesign::*;
pub use command::*;
pub use filesystem::*;
pub use inspector::*;
pub use install_name_tool::*;

use std::path::Path;

use crate::error::Result;

/// Lists what a binary links against.
pub trait Inspector {
    /// Raw dependency references, in declaration order.
    ///
    /// Fails with `InspectionFailure` if the file cannot be read.
    fn dependencies(&self, file: &Path) -> Result<Vec<String>>;

    /// Raw rpath entries, in declaration order.
    fn rpath_entries(&self, file: &Path) -> Result<Vec<String>>;
}

/// Rewrites paths embedded in a binary.
pub trait Patcher {
    /// Changes the dependency reference `old` to `new`; absent references are left alone.
    fn rewrite_reference(&self, file: &Path, old: &str, new: &str) -> Result<()>;

    /// Replaces the rpath entry `old` with `new`.
    fn rewrite_rpath(&self, file: &Path, old: &str, new: &str) -> Result<()>;

    /// Sets the library's own install name.
    fn set_identity(&self, file: &Path, identity: &str) -> Result<()>;
}

/// Re-applies a code signature after a binary was modified.
pub trait Signer {
    /// Signs `file` ad hoc.
    fn sign(&self, file: &Path) -> Result<()>;
}

/// Filesystem operations used while installing libraries.
pub trait Filesystem {
    /// Returns true if `path` exists, ignoring surrounding whitespace.
    fn exists(&self, path: &Path) -> bool;

    /// Copies `from` to `to`, replacing `to` if present.
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Gives the owner write permission on `path`.
    fn make_writable(&self, path: &Path) -> Result<()>;

    /// Creates `path` and any missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Removes `path` and everything below it.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// The mutating collaborators used when applying a plan.
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    /// Copies files and manages the destination directory
    pub filesystem: &'a dyn Filesystem,
    /// Rewrites embedded paths
    pub patcher: &'a dyn Patcher,
    /// Re-signs patched binaries
    pub signer: &'a dyn Signer,
}
