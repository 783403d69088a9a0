//! Patching install names with Apple's `install_name_tool`.

use std::path::Path;

use super::{run_tool, Patcher};
use crate::error::Result;

/// Name of the patching tool.
pub const INSTALL_NAME_TOOL: &str = "install_name_tool";

/// [`Patcher`] backed by `install_name_tool`.
#[derive(Debug, Clone)]
pub struct InstallNameTool {
    program: String,
}

impl Default for InstallNameTool {
    fn default() -> Self {
        Self {
            program: INSTALL_NAME_TOOL.to_string(),
        }
    }
}

impl InstallNameTool {
    /// Uses the `install_name_tool` found on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific `install_name_tool` binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Patcher for InstallNameTool {
    fn rewrite_reference(&self, file: &Path, old: &str, new: &str) -> Result<()> {
        let file = file.to_string_lossy();
        run_tool(&self.program, &["-change", old, new, &*file])
    }

    fn rewrite_rpath(&self, file: &Path, old: &str, new: &str) -> Result<()> {
        let file = file.to_string_lossy();
        run_tool(&self.program, &["-rpath", old, new, &*file])
    }

    fn set_identity(&self, file: &Path, identity: &str) -> Result<()> {
        let file = file.to_string_lossy();
        run_tool(&self.program, &["-id", identity, &*file])
    }
}
