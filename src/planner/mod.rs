//! Turning a dependency graph into an ordered list of mutations.
//!
//! Planning only reads the graph, the settings and whether paths exist, so a
//! plan can be inspected (or rejected) before anything on disk changes.
//! [`apply`] then runs it strictly in order and stops at the first failure.

mod operation;

pub use operation::*;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::settings::{Permissions, Settings};
use crate::tools::{Filesystem, Tools};

/// Plans the copies and rewrites that make a set of binaries self-contained.
pub struct BundlePlanner<'a> {
    settings: &'a Settings,
    graph: &'a DependencyGraph,
    bare_filenames: bool,
}

impl<'a> BundlePlanner<'a> {
    /// Creates a planner for `graph`.
    pub fn new(settings: &'a Settings, graph: &'a DependencyGraph) -> Self {
        Self {
            settings,
            graph,
            bare_filenames: false,
        }
    }

    /// Also rewrites references that name a library by file name only.
    ///
    /// Needed once the resolver had to locate any library without its stated
    /// prefix.
    pub fn with_bare_filename_matching(mut self, enabled: bool) -> Self {
        self.bare_filenames = enabled;
        self
    }

    /// Produces the full plan.
    ///
    /// Libraries come first, last discovered first, followed by the files to
    /// fix in reverse configuration order. Fails with `DestinationUnavailable`
    /// before emitting anything if the destination policy forbids the run.
    pub fn plan(&self, filesystem: &dyn Filesystem) -> Result<Vec<Operation>> {
        let mut ops = Vec::new();

        if self.settings.bundle_libraries() {
            self.plan_destination(filesystem, &mut ops)?;

            for dependency in self.graph.dependencies().iter().rev() {
                self.plan_dependency(dependency, &mut ops);
            }
        }

        for file in self.graph.top_level_files().iter().rev() {
            ops.push(Operation::Copy {
                from: file.clone(),
                to: file.clone(),
                overwrite: true,
            });
            ops.push(Operation::MakeWritable(file.clone()));
            self.plan_fixes(file, file, &mut ops);
        }

        Ok(ops)
    }

    fn plan_destination(&self, filesystem: &dyn Filesystem, ops: &mut Vec<Operation>) -> Result<()> {
        let dest = PathBuf::from(self.settings.dest_dir());
        let unavailable = |reason: &str| Error::DestinationUnavailable {
            path: dest.clone(),
            reason: reason.to_string(),
        };

        if filesystem.exists(&dest) {
            if !self.settings.can(Permissions::OVERWRITE_DIR) {
                return Err(unavailable(
                    "it already exists; pass --overwrite-dir to replace it",
                ));
            }
            ops.push(Operation::RemoveDirectory(dest.clone()));
            ops.push(Operation::CreateDirectory(dest));
        } else if self.settings.can(Permissions::CREATE_DIR) {
            ops.push(Operation::CreateDirectory(dest));
        } else {
            return Err(unavailable(
                "it does not exist; create it or pass --create-dir",
            ));
        }
        Ok(())
    }

    fn plan_dependency(&self, dependency: &Dependency, ops: &mut Vec<Operation>) {
        let source = PathBuf::from(dependency.original_path());
        let target = dependency.install_path(self.settings);

        ops.push(Operation::Copy {
            from: source.clone(),
            to: target.clone(),
            overwrite: self.settings.can(Permissions::OVERWRITE_FILES),
        });
        ops.push(Operation::SetIdentity {
            file: target.clone(),
            identity: dependency.inner_path(self.settings),
        });
        self.plan_fixes(&target, &source, ops);
    }

    /// Rewrites references and rpaths of `target`, which is a copy of `source`.
    fn plan_fixes(&self, target: &Path, source: &Path, ops: &mut Vec<Operation>) {
        for dependency in self.graph.dependencies_of(source) {
            let new = dependency.inner_path(self.settings);
            for old in self.stale_references(dependency, &new) {
                ops.push(Operation::ChangeReference {
                    file: target.to_path_buf(),
                    old,
                    new: new.clone(),
                });
            }
        }

        // A binary may carry a given rpath only once, so at most one entry is retargeted.
        let inner = self.settings.inner_path();
        let entries = self.graph.rpath_entries_of(source);
        if !entries.iter().any(|entry| same_directory(entry, inner)) {
            if let Some(entry) = entries.first() {
                ops.push(Operation::RewriteRpath {
                    file: target.to_path_buf(),
                    old: entry.clone(),
                    new: inner.to_string(),
                });
            }
        }

        if self.settings.can(Permissions::CODESIGN) {
            ops.push(Operation::Sign(target.to_path_buf()));
        }
    }

    /// Every string a binary may still use for `dependency`, except `new`.
    fn stale_references(&self, dependency: &Dependency, new: &str) -> Vec<String> {
        let bare = self
            .bare_filenames
            .then(|| dependency.filename().to_string());

        let mut seen = HashSet::new();
        dependency
            .references()
            .chain(bare)
            .filter(|old| old != new && seen.insert(old.clone()))
            .collect()
    }
}

fn same_directory(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Runs `operations` in order, stopping at the first failure.
pub fn apply(operations: &[Operation], tools: Tools<'_>, progress: &ProgressBar) -> Result<()> {
    progress.set_length(operations.len() as u64);

    for op in operations {
        debug!("{}", op);
        if let Operation::Copy { to, .. } = op {
            if let Some(name) = to.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
        }
        apply_one(op, tools)?;
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(())
}

fn apply_one(op: &Operation, tools: Tools<'_>) -> Result<()> {
    match op {
        Operation::RemoveDirectory(dir) => {
            info!("Erasing old output directory {}", dir.display());
            tools.filesystem.remove_dir_all(dir)
        }
        Operation::CreateDirectory(dir) => {
            info!("Creating output directory {}", dir.display());
            tools.filesystem.create_dir_all(dir)
        }
        Operation::Copy {
            from,
            to,
            overwrite,
        } => {
            if from != to && !overwrite && tools.filesystem.exists(to) {
                return Err(Error::DestinationFileExists { path: to.clone() });
            }
            if from != to {
                info!("Copying {} to {}", from.display(), to.display());
            }
            tools.filesystem.copy(from, to)
        }
        Operation::MakeWritable(file) => tools.filesystem.make_writable(file),
        Operation::SetIdentity { file, identity } => tools.patcher.set_identity(file, identity),
        Operation::ChangeReference { file, old, new } => {
            tools.patcher.rewrite_reference(file, old, new)
        }
        Operation::RewriteRpath { file, old, new } => tools.patcher.rewrite_rpath(file, old, new),
        Operation::Sign(file) => tools.signer.sign(file),
    }
}
