//! Turning embedded reference strings into files on disk.
//!
//! A binary names its libraries either by path or relative to one of the
//! loader markers (`@rpath/`, `@loader_path/`, `@executable_path/`). The
//! [`PathResolver`] maps each of them to the real file, in this order:
//!
//! 1. a previous answer for the same `@rpath`/`@loader_path` string
//! 2. the directory of the referencing binary
//! 3. the referencing binary's own rpath entries, in declaration order
//! 4. the configured search paths, in declaration order
//! 5. the [`DirectoryPrompt`], whose answer is appended to the search paths
//!
//! Earlier candidates always win, so identical inputs resolve identically.

mod prompt;
mod reference;

pub use prompt::*;
pub use reference::*;

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::settings::{Exclusion, Settings};
use crate::util::{canonicalize, ensure_trailing_slash, file_exists, split_path};

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The library should be copied into the bundle
    Bundled(Dependency),
    /// The library resolved but is left where it is
    Excluded {
        /// Where the library lives
        path: String,
        /// Why it is not bundled
        reason: Exclusion,
    },
}

/// Maps raw references to canonical library paths.
pub struct PathResolver<'a> {
    settings: &'a Settings,
    search_paths: Vec<String>,
    executable_dir: Option<String>,
    cache: HashMap<String, String>,
    missing_prefixes: bool,
    prompt: Box<dyn DirectoryPrompt + 'a>,
}

impl<'a> PathResolver<'a> {
    /// Creates a resolver using the configured search paths.
    pub fn new(settings: &'a Settings, prompt: impl DirectoryPrompt + 'a) -> Self {
        Self {
            settings,
            search_paths: settings.search_paths().to_vec(),
            executable_dir: settings.executable_dir(),
            cache: HashMap::new(),
            missing_prefixes: false,
            prompt: Box::new(prompt),
        }
    }

    /// Current search directories, including any added by the prompt.
    pub fn search_paths(&self) -> &[String] {
        &self.search_paths
    }

    /// Returns true once any library had to be located without its stated prefix.
    ///
    /// Binaries may then reference such libraries by bare file name, so the
    /// planner also rewrites those.
    pub fn missing_prefixes(&self) -> bool {
        self.missing_prefixes
    }

    /// Resolves `raw`, as declared by `dependent`, whose rpath entries are `rpaths`.
    pub fn resolve(&mut self, raw: &str, dependent: &Path, rpaths: &[String]) -> Result<Resolution> {
        let raw = raw.trim_end();
        let reference = Reference::parse(raw);

        // System libraries may exist only inside the dyld shared cache.
        if let Reference::Absolute(path) = reference {
            if Settings::is_system_library(path) {
                debug!("{} is not bundled ({:?})", path, Exclusion::System);
                return Ok(Resolution::Excluded {
                    path: path.to_string(),
                    reason: Exclusion::System,
                });
            }
        }

        let original = match reference {
            Reference::Rpath { .. } | Reference::LoaderPath { .. } => {
                self.resolve_relocatable(&reference, dependent, rpaths)?
            }
            Reference::ExecutablePath(path) => path.to_string(),
            Reference::Absolute(path) => canonicalize(path).unwrap_or_else(|| {
                warn!("cannot resolve path '{}'", path);
                path.to_string()
            }),
        };

        let mut dependency = Dependency::new(&original);
        if original != raw {
            dependency.add_alias(raw);
        }

        if let Some(reason) = self.settings.exclusion_for(dependency.directory()) {
            debug!("{} is not bundled ({:?})", original, reason);
            return Ok(Resolution::Excluded {
                path: original,
                reason,
            });
        }

        if !Self::is_located(&dependency) {
            if let Some(dir) = self.find_in_search_paths(dependency.filename()) {
                info!("found {} in {}", dependency.filename(), dir);
                dependency.relocate(&dir);
                self.missing_prefixes = true;
            }
        }

        if !Self::is_located(&dependency) {
            warn!(
                "library {} has an incomplete name (location unknown)",
                dependency.filename()
            );
            self.missing_prefixes = true;
            let dir = self.escalate(dependency.filename())?;
            dependency.relocate(&dir);
        }

        Ok(Resolution::Bundled(dependency))
    }

    /// Resolves an `@rpath/` or `@loader_path/` reference to a canonical path.
    ///
    /// Passing the reference itself as `dependent` skips the binary-relative
    /// candidates, which is how leftover relocatable paths are re-resolved.
    pub fn resolve_relocatable(
        &mut self,
        reference: &Reference<'_>,
        dependent: &Path,
        rpaths: &[String],
    ) -> Result<String> {
        let raw = reference.as_str();
        let Some(suffix) = reference.suffix() else {
            return Ok(raw.to_string());
        };

        if let Some(hit) = self.cache.get(raw) {
            return Ok(hit.clone());
        }

        let dependent = dependent.to_string_lossy();
        let (dependent_dir, _) = split_path(&dependent);
        let self_referential = dependent == raw;

        let found = (!self_referential)
            .then(|| canonicalize(&format!("{dependent_dir}{suffix}")))
            .flatten()
            .or_else(|| {
                rpaths.iter().find_map(|entry| {
                    let base = self.expand_rpath_entry(entry, dependent_dir)?;
                    canonicalize(&format!("{}{}", ensure_trailing_slash(&base), suffix))
                })
            })
            .or_else(|| {
                self.find_in_search_paths(suffix).map(|dir| {
                    let candidate = format!("{dir}{suffix}");
                    canonicalize(&candidate).unwrap_or(candidate)
                })
            });

        let path = match found {
            Some(path) => path,
            None => {
                warn!("can't get path for '{}'", raw);
                let candidate = format!("{}{}", self.escalate(suffix)?, suffix);
                canonicalize(&candidate).unwrap_or(candidate)
            }
        };

        debug!("{} -> {}", raw, path);
        self.cache.insert(raw.to_string(), path.clone());
        Ok(path)
    }

    /// Turns an rpath entry into a directory, expanding loader markers.
    fn expand_rpath_entry(&self, entry: &str, dependent_dir: &str) -> Option<String> {
        let entry = ensure_trailing_slash(entry.trim());
        if let Some(rest) = entry.strip_prefix(LOADER_PATH_MARKER) {
            Some(format!("{dependent_dir}{rest}"))
        } else if let Some(rest) = entry.strip_prefix(EXECUTABLE_PATH_MARKER) {
            Some(format!("{}{}", self.executable_dir.as_deref()?, rest))
        } else if entry.starts_with('@') {
            None
        } else {
            Some(entry)
        }
    }

    fn find_in_search_paths(&self, name: &str) -> Option<String> {
        self.search_paths
            .iter()
            .find(|dir| file_exists(&format!("{dir}{name}")))
            .cloned()
    }

    fn is_located(dependency: &Dependency) -> bool {
        !dependency.directory().is_empty() && file_exists(&dependency.original_path())
    }

    /// Finds a directory holding `name`, asking the prompt as a last resort.
    fn escalate(&mut self, name: &str) -> Result<String> {
        if let Some(dir) = self.find_in_search_paths(name) {
            warn!(
                "{}{} was found; it may not be handled correctly, check the result with 'otool -L'",
                dir, name
            );
            return Ok(dir);
        }

        loop {
            let Some(answer) = self.prompt.directory_for(name) else {
                return Err(Error::UnresolvedDependency {
                    reference: name.to_string(),
                });
            };

            let dir = ensure_trailing_slash(answer.trim());
            if !file_exists(&format!("{dir}{name}")) {
                warn!("{}{} does not exist, try again", dir, name);
                continue;
            }

            warn!(
                "{}{} was found; it may not be handled correctly, check the result with 'otool -L'",
                dir, name
            );
            self.search_paths.push(dir.clone());
            return Ok(dir);
        }
    }
}
