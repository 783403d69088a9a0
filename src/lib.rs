//! dylib-bundler - Make macOS applications carry their own libraries.
//!
//! This library finds every non-system dynamic library a set of Mach-O
//! executables or plug-ins link against, copies those libraries into a
//! destination directory, and rewrites all embedded references (install names,
//! dependency paths, rpaths) so the binaries load the bundled copies.
//!
//! # Pipeline
//!
//! 1. [`PathResolver`] maps each raw reference (`@rpath/...`,
//!    `@loader_path/...`, absolute paths) to a real file
//! 2. [`DependencyGraph`] inspects binaries until no new library appears
//! 3. [`BundlePlanner`] turns the graph into an ordered list of [`Operation`]s
//! 4. [`apply`] runs them through the [`Filesystem`], [`Patcher`] and [`Signer`]
//!
//! # Example
//!
//! ```no_run
//! use dylib_bundler::{
//!     bundle, Codesign, HostFilesystem, InstallNameTool, MachOInspector, Permissions,
//!     Settings, TerminalPrompt, Tools,
//! };
//! use indicatif::ProgressBar;
//!
//! fn main() -> dylib_bundler::Result<()> {
//!     let settings = Settings::new()
//!         .with_bundling(true)
//!         .with_dest_dir("MyApp.app/Contents/libs")
//!         .allow(Permissions::CREATE_DIR)
//!         .with_file_to_fix("MyApp.app/Contents/MacOS/MyApp");
//!
//!     let tools = Tools {
//!         filesystem: &HostFilesystem,
//!         patcher: &InstallNameTool::new(),
//!         signer: &Codesign::new(),
//!     };
//!
//!     let report = bundle(&settings, &MachOInspector, tools, TerminalPrompt, &ProgressBar::hidden())?;
//!     println!("bundled {} libraries", report.libraries.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dependency;
pub mod error;
pub mod graph;
pub mod macho;
pub mod planner;
pub mod resolver;
pub mod settings;
pub mod tools;
pub mod util;

#[cfg(test)]
mod testing;

// Re-export main types
pub use dependency::Dependency;
pub use error::{Error, Result};
pub use graph::DependencyGraph;
pub use macho::MachOContext;
pub use planner::{apply, BundlePlanner, Operation};
pub use resolver::{DeclinePrompt, DirectoryPrompt, PathResolver, TerminalPrompt};
pub use settings::{Permissions, Settings};
pub use tools::{
    Codesign, Filesystem, HostFilesystem, Inspector, InstallNameTool, MachOInspector, Patcher,
    Signer, Tools,
};

use indicatif::ProgressBar;
use tracing::{info, warn};

/// What a bundling run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    /// Libraries found, in discovery order
    pub libraries: Vec<Dependency>,
    /// Number of operations applied
    pub operations: usize,
    /// Number of load-command rewrites among them
    pub patches: usize,
}

/// Collects, plans and applies a full bundling run.
///
/// Unresolvable references are passed to `prompt`. Nothing on disk changes
/// unless collection and planning both succeed.
pub fn bundle<'a>(
    settings: &'a Settings,
    inspector: &dyn Inspector,
    tools: Tools<'_>,
    prompt: impl DirectoryPrompt + 'a,
    progress: &ProgressBar,
) -> Result<BundleReport> {
    let mut resolver = PathResolver::new(settings, prompt);
    let graph = DependencyGraph::collect(settings, inspector, &mut resolver)?;

    if !graph.dependencies().is_empty() {
        info!("Libraries to bundle:");
        for dependency in graph.dependencies() {
            info!("  {}", dependency);
        }
    }

    let bare_filenames = resolver.missing_prefixes();
    if bare_filenames {
        warn!("some libraries were found without their stated prefix; references by bare file name will be rewritten too");
    }

    let operations = BundlePlanner::new(settings, &graph)
        .with_bare_filename_matching(bare_filenames)
        .plan(tools.filesystem)?;
    apply(&operations, tools, progress)?;

    Ok(BundleReport {
        libraries: graph.dependencies().to_vec(),
        operations: operations.len(),
        patches: operations.iter().filter(|op| op.is_patch()).count(),
    })
}
