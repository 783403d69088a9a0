//! Run configuration.
//!
//! [`Settings`] is assembled once from the command line and then shared by
//! reference with the resolver, the dependency graph and the planner. Paths
//! are kept as strings because they are compared byte-for-byte against the
//! references embedded in binaries.

use std::env;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::util::ensure_trailing_slash;

/// Default directory the libraries are copied into.
pub const DEFAULT_DEST_DIR: &str = "./libs/";

/// Default install path the copied libraries are referenced by.
pub const DEFAULT_INNER_PATH: &str = "@executable_path/../libs/";

/// Locations whose libraries ship with the OS and are never bundled.
pub const SYSTEM_LIBRARY_PREFIXES: &[&str] = &["/usr/lib/", "/System/Library/"];

/// Environment variables dyld consults, in the order they are searched.
pub const DYLD_PATH_VARIABLES: &[&str] = &[
    "DYLD_LIBRARY_PATH",
    "DYLD_FALLBACK_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
];

bitflags! {
    /// What the bundler is allowed to do to the filesystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        /// Replace files that already exist in the destination
        const OVERWRITE_FILES = 0x1;
        /// Erase and recreate the destination directory if it exists
        const OVERWRITE_DIR = 0x2;
        /// Create the destination directory if it is missing
        const CREATE_DIR = 0x4;
        /// Re-apply an ad-hoc signature to every patched binary
        const CODESIGN = 0x8;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::CODESIGN
    }
}

/// Why a resolved library is left out of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Lives under `/usr/lib/` or `/System/Library/`
    System,
    /// Lives inside a `.framework` container
    Framework,
    /// Already expressed relative to the executable
    ExecutableRelative,
    /// Lives under a user-ignored prefix
    Ignored,
}

/// Configuration for one bundling run.
#[derive(Debug, Clone)]
pub struct Settings {
    dest_dir: String,
    inner_path: String,
    permissions: Permissions,
    bundle_libraries: bool,
    search_paths: Vec<String>,
    ignored_prefixes: Vec<String>,
    files_to_fix: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dest_dir: DEFAULT_DEST_DIR.to_string(),
            inner_path: DEFAULT_INNER_PATH.to_string(),
            permissions: Permissions::default(),
            bundle_libraries: false,
            search_paths: Vec::new(),
            ignored_prefixes: Vec::new(),
            files_to_fix: Vec::new(),
        }
    }
}

impl Settings {
    /// Creates settings with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory libraries are copied into.
    pub fn with_dest_dir(mut self, dir: impl AsRef<str>) -> Self {
        self.dest_dir = ensure_trailing_slash(dir.as_ref());
        self
    }

    /// Sets the install path prefix copied libraries are referenced by.
    pub fn with_inner_path(mut self, path: impl AsRef<str>) -> Self {
        self.inner_path = ensure_trailing_slash(path.as_ref());
        self
    }

    /// Grants additional permissions.
    pub fn allow(mut self, permissions: Permissions) -> Self {
        self.permissions |= permissions;
        self
    }

    /// Revokes permissions.
    pub fn deny(mut self, permissions: Permissions) -> Self {
        self.permissions -= permissions;
        self
    }

    /// Enables or disables copying libraries into the destination.
    pub fn with_bundling(mut self, enabled: bool) -> Self {
        self.bundle_libraries = enabled;
        self
    }

    /// Appends a directory to the library search list.
    pub fn with_search_path(mut self, path: impl AsRef<str>) -> Self {
        let path = ensure_trailing_slash(path.as_ref());
        if !path.is_empty() {
            self.search_paths.push(path);
        }
        self
    }

    /// Appends several directories to the library search list.
    pub fn with_search_paths<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .fold(self, |settings, path| settings.with_search_path(path))
    }

    /// Excludes libraries under `prefix` from bundling.
    pub fn with_ignored_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.ignored_prefixes
            .push(ensure_trailing_slash(prefix.as_ref()));
        self
    }

    /// Adds an executable or plug-in whose references should be fixed.
    pub fn with_file_to_fix(mut self, path: impl Into<PathBuf>) -> Self {
        self.files_to_fix.push(path.into());
        self
    }

    /// Directory libraries are copied into, with trailing slash.
    pub fn dest_dir(&self) -> &str {
        &self.dest_dir
    }

    /// Install path prefix for copied libraries, with trailing slash.
    pub fn inner_path(&self) -> &str {
        &self.inner_path
    }

    /// Granted permissions.
    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Returns true if `permission` is granted.
    #[inline]
    pub fn can(&self, permission: Permissions) -> bool {
        self.permissions.contains(permission)
    }

    /// Whether libraries are copied into the destination.
    pub fn bundle_libraries(&self) -> bool {
        self.bundle_libraries
    }

    /// Library search directories, in search order.
    pub fn search_paths(&self) -> &[String] {
        &self.search_paths
    }

    /// Ignored prefixes, in the order they were given.
    pub fn ignored_prefixes(&self) -> &[String] {
        &self.ignored_prefixes
    }

    /// Top-level files to fix, in the order they were given.
    pub fn files_to_fix(&self) -> &[PathBuf] {
        &self.files_to_fix
    }

    /// Directory of the first file to fix, which `@executable_path` stands for.
    pub fn executable_dir(&self) -> Option<String> {
        let first = self.files_to_fix.first()?;
        let parent = first.parent().unwrap_or(Path::new(""));
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        Some(ensure_trailing_slash(&dir.to_string_lossy()))
    }

    /// Where a library named `name` is copied to.
    pub fn install_path(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.dest_dir, name))
    }

    /// The reference a library named `name` is rewritten to.
    pub fn inner_reference(&self, name: &str) -> String {
        format!("{}{}", self.inner_path, name)
    }

    /// Returns true if `prefix` is a system library location.
    pub fn is_system_library(prefix: &str) -> bool {
        SYSTEM_LIBRARY_PREFIXES
            .iter()
            .any(|system| prefix.starts_with(system))
    }

    /// Returns true if `prefix` lies under an ignored prefix.
    pub fn is_prefix_ignored(&self, prefix: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|ignored| prefix.starts_with(ignored.as_str()))
    }

    /// Classifies a library directory, returning why it is not bundled.
    pub fn exclusion_for(&self, prefix: &str) -> Option<Exclusion> {
        if prefix.contains(".framework") {
            Some(Exclusion::Framework)
        } else if prefix.contains("@executable_path") {
            Some(Exclusion::ExecutableRelative)
        } else if Self::is_system_library(prefix) {
            Some(Exclusion::System)
        } else if self.is_prefix_ignored(prefix) {
            Some(Exclusion::Ignored)
        } else {
            None
        }
    }
}

/// Collects the dyld search directories from the environment.
pub fn environment_search_paths() -> Vec<String> {
    DYLD_PATH_VARIABLES
        .iter()
        .filter_map(|var| env::var(var).ok())
        .flat_map(|value| {
            value
                .split(':')
                .filter(|item| !item.is_empty())
                .map(ensure_trailing_slash)
                .collect::<Vec<_>>()
        })
        .collect()
}
