//! A library discovered while walking the dependency tree.

use std::fmt;
use std::path::PathBuf;

use crate::settings::Settings;
use crate::util::split_path;

/// One library that will be installed into the bundle.
///
/// Two dependencies with the same file name are the same install target, so
/// [`Dependency::merge_if_same_as`] folds them together. That conflates
/// unrelated libraries that happen to share a name; the first one seen wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Directory of the real file, with trailing slash
    directory: String,
    /// File name of the real file
    filename: String,
    /// Other reference strings that point at this library
    aliases: Vec<String>,
    /// File name used inside the destination directory
    installed_name: String,
}

impl Dependency {
    /// Creates a dependency for the library at `path`.
    pub fn new(path: &str) -> Self {
        let (directory, filename) = split_path(path);
        Self {
            directory: directory.to_string(),
            filename: filename.to_string(),
            aliases: Vec::new(),
            installed_name: filename.to_string(),
        }
    }

    /// Directory of the real file, with trailing slash (may be empty).
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// File name of the real file.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Full path of the real file.
    pub fn original_path(&self) -> String {
        format!("{}{}", self.directory, self.filename)
    }

    /// File name used inside the destination directory.
    pub fn installed_name(&self) -> &str {
        &self.installed_name
    }

    /// Alternative reference strings, in the order they were first seen.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Records another reference string for this library.
    ///
    /// Returns false if it was already known.
    pub fn add_alias(&mut self, alias: &str) -> bool {
        if alias == self.original_path() || self.aliases.iter().any(|a| a == alias) {
            return false;
        }
        self.aliases.push(alias.to_string());
        true
    }

    /// Moves the library to another directory, keeping its file name.
    pub fn relocate(&mut self, directory: &str) {
        self.directory = crate::util::ensure_trailing_slash(directory);
    }

    /// Where the copy lives after bundling.
    pub fn install_path(&self, settings: &Settings) -> PathBuf {
        settings.install_path(&self.installed_name)
    }

    /// What referencing binaries are rewritten to point at.
    pub fn inner_path(&self, settings: &Settings) -> String {
        settings.inner_reference(&self.installed_name)
    }

    /// Every string a binary may use to reference this library.
    pub fn references(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.original_path()).chain(self.aliases.iter().cloned())
    }

    /// Folds `other` into this dependency if both install to the same file name.
    ///
    /// `other`'s path and aliases become aliases of `self`.
    pub fn merge_if_same_as(&mut self, other: &Dependency) -> bool {
        if other.filename != self.filename {
            return false;
        }
        self.add_alias(&other.original_path());
        for alias in &other.aliases {
            self.add_alias(alias);
        }
        true
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.filename, self.directory)?;
        for alias in &self.aliases {
            write!(f, "\n     symlink --> {alias}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_creation() {
        let dep = Dependency::new("/opt/lib/libX.1.dylib");
        assert_eq!(dep.directory(), "/opt/lib/");
        assert_eq!(dep.filename(), "libX.1.dylib");
        assert_eq!(dep.installed_name(), "libX.1.dylib");
        assert_eq!(dep.original_path(), "/opt/lib/libX.1.dylib");
    }

    #[test]
    fn test_aliases_are_deduplicated() {
        let mut dep = Dependency::new("/opt/lib/libX.1.dylib");
        assert!(dep.add_alias("/opt/lib/libX.dylib"));
        assert!(!dep.add_alias("/opt/lib/libX.dylib"));
        assert!(!dep.add_alias("/opt/lib/libX.1.dylib"));
        assert_eq!(dep.aliases(), ["/opt/lib/libX.dylib"]);
    }

    #[test]
    fn test_merge_same_filename() {
        let mut a = Dependency::new("/opt/lib/libX.dylib");
        a.add_alias("@rpath/libX.dylib");
        let mut b = Dependency::new("/usr/local/lib/libX.dylib");
        b.add_alias("@loader_path/libX.dylib");

        assert!(a.merge_if_same_as(&b));
        assert_eq!(a.original_path(), "/opt/lib/libX.dylib");
        assert_eq!(
            a.aliases(),
            [
                "@rpath/libX.dylib",
                "/usr/local/lib/libX.dylib",
                "@loader_path/libX.dylib"
            ]
        );
    }

    #[test]
    fn test_merge_is_order_independent_on_alias_set() {
        let mut x = Dependency::new("/opt/lib/libY.dylib");
        x.add_alias("@rpath/libY.dylib");
        let mut y = Dependency::new("/opt/lib/libY.dylib");
        y.add_alias("/opt/lib/current/libY.dylib");

        let mut xy = x.clone();
        xy.merge_if_same_as(&y);
        let mut yx = y.clone();
        yx.merge_if_same_as(&x);

        let mut left: Vec<_> = xy.references().collect();
        let mut right: Vec<_> = yx.references().collect();
        left.sort();
        right.sort();
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_different_filename() {
        let mut a = Dependency::new("/opt/lib/libX.dylib");
        let b = Dependency::new("/opt/lib/libY.dylib");
        assert!(!a.merge_if_same_as(&b));
        assert!(a.aliases().is_empty());
    }

    #[test]
    fn test_paths_from_settings() {
        let settings = Settings::new()
            .with_dest_dir("App.app/Contents/libs")
            .with_inner_path("@executable_path/../libs");
        let mut dep = Dependency::new("libZ.dylib");
        assert_eq!(dep.directory(), "");
        dep.relocate("/opt/z");

        assert_eq!(dep.original_path(), "/opt/z/libZ.dylib");
        assert_eq!(
            dep.install_path(&settings),
            PathBuf::from("App.app/Contents/libs/libZ.dylib")
        );
        assert_eq!(dep.inner_path(&settings), "@executable_path/../libs/libZ.dylib");
    }
}
