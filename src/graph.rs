//! Discovering every library a set of binaries needs.
//!
//! The graph starts from the files to fix and keeps inspecting newly found
//! libraries until a pass finds nothing new. Each library file is inspected
//! once, which also breaks reference cycles.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dependency::Dependency;
use crate::error::Result;
use crate::resolver::{PathResolver, Reference, Resolution};
use crate::settings::Settings;
use crate::tools::Inspector;
use crate::util::canonicalize;

/// Libraries to bundle and which files reference them.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Distinct libraries, in discovery order
    dependencies: Vec<Dependency>,
    /// Position in `dependencies`, keyed by file name
    index_by_filename: HashMap<String, usize>,
    /// Libraries each inspected file references
    dependencies_by_file: HashMap<PathBuf, Vec<usize>>,
    /// Declared rpath entries of each inspected file
    rpaths_by_file: HashMap<PathBuf, Vec<String>>,
    inspected: HashSet<PathBuf>,
    /// Canonical paths of the files to fix, in configuration order
    top_level_files: Vec<PathBuf>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the full graph for the files to fix in `settings`.
    pub fn collect(
        settings: &Settings,
        inspector: &dyn Inspector,
        resolver: &mut PathResolver<'_>,
    ) -> Result<Self> {
        let mut graph = Self::new();

        for file in settings.files_to_fix() {
            let raw = file.to_string_lossy();
            let canonical = canonicalize(&raw).map_or_else(|| file.clone(), PathBuf::from);
            info!("Collecting dependencies of {}", raw);
            graph.inspect(&canonical, inspector, resolver)?;
            graph.top_level_files.push(canonical);
        }

        let passes = graph.expand_to_fixed_point(inspector, resolver)?;
        debug!(
            "found {} libraries in {} passes",
            graph.dependencies.len(),
            passes
        );

        Ok(graph)
    }

    /// Records the references of `file`.
    ///
    /// Does nothing if `file` was inspected before. Framework and system
    /// library references are skipped; everything else is resolved and either
    /// added as a new dependency or merged into the one with the same file
    /// name.
    pub fn inspect(
        &mut self,
        file: &Path,
        inspector: &dyn Inspector,
        resolver: &mut PathResolver<'_>,
    ) -> Result<()> {
        if self.inspected.contains(file) {
            return Ok(());
        }

        let rpaths = inspector.rpath_entries(file)?;
        let references = inspector.dependencies(file)?;

        for raw in &references {
            let reference = Reference::parse(raw.trim_end());
            if reference.is_framework() {
                warn!(
                    "{} is a framework; frameworks are not bundled, ignoring it",
                    raw
                );
                continue;
            }
            if Settings::is_system_library(reference.as_str()) {
                continue;
            }

            match resolver.resolve(raw, file, &rpaths)? {
                Resolution::Bundled(dependency) => {
                    self.add(file, dependency);
                }
                Resolution::Excluded { path, reason } => {
                    debug!("{}: skipping {} ({:?})", file.display(), path, reason);
                }
            }
        }

        self.rpaths_by_file.insert(file.to_path_buf(), rpaths);
        self.dependencies_by_file.entry(file.to_path_buf()).or_default();
        self.inspected.insert(file.to_path_buf());
        Ok(())
    }

    /// Inspects known libraries until a full pass adds nothing new.
    ///
    /// Returns the number of passes made.
    pub fn expand_to_fixed_point(
        &mut self,
        inspector: &dyn Inspector,
        resolver: &mut PathResolver<'_>,
    ) -> Result<usize> {
        let mut passes = 0;

        loop {
            passes += 1;
            let known = self.dependencies.len();

            for index in 0..known {
                let path = self.dependencies[index].original_path();
                let reference = Reference::parse(&path);
                let path = if reference.is_relocatable() {
                    resolver.resolve_relocatable(&reference, Path::new(&path), &[])?
                } else {
                    path
                };
                self.inspect(Path::new(&path), inspector, resolver)?;
            }

            if self.dependencies.len() == known {
                return Ok(passes);
            }
        }
    }

    /// Adds `dependency` as referenced by `file`.
    ///
    /// Returns true if it was not known before.
    fn add(&mut self, file: &Path, dependency: Dependency) -> bool {
        let (index, added) = match self.index_by_filename.get(dependency.filename()) {
            Some(&index) => {
                self.dependencies[index].merge_if_same_as(&dependency);
                (index, false)
            }
            None => {
                let index = self.dependencies.len();
                self.index_by_filename
                    .insert(dependency.filename().to_string(), index);
                self.dependencies.push(dependency);
                (index, true)
            }
        };

        let referenced = self.dependencies_by_file.entry(file.to_path_buf()).or_default();
        if !referenced.contains(&index) {
            referenced.push(index);
        }
        added
    }

    /// All libraries to bundle, in discovery order.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Libraries referenced by `file`, in the order `file` declares them.
    pub fn dependencies_of(&self, file: &Path) -> impl Iterator<Item = &Dependency> + '_ {
        self.dependencies_by_file
            .get(file)
            .into_iter()
            .flatten()
            .map(|&index| &self.dependencies[index])
    }

    /// Declared rpath entries of `file`.
    pub fn rpath_entries_of(&self, file: &Path) -> &[String] {
        self.rpaths_by_file
            .get(file)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns true once `file` has been inspected.
    pub fn is_inspected(&self, file: &Path) -> bool {
        self.inspected.contains(file)
    }

    /// Canonical paths of the files to fix, in configuration order.
    pub fn top_level_files(&self) -> &[PathBuf] {
        &self.top_level_files
    }
}
