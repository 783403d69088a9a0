//! Native [`Inspector`] reading load commands straight from the file.

use std::path::Path;

use tracing::{debug, trace};

use super::Inspector;
use crate::error::{Error, Result};
use crate::macho::MachOContext;

/// [`Inspector`] that parses Mach-O load commands in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MachOInspector;

impl MachOInspector {
    /// Creates an inspector.
    pub fn new() -> Self {
        Self
    }

    fn open(file: &Path) -> Result<MachOContext> {
        let ctx = MachOContext::open(file).map_err(|e| Error::inspection(file, &e))?;
        match ctx.install_name() {
            Some(id) => debug!("{}: {} with id {}", file.display(), ctx.header, id),
            None => debug!("{}: {}", file.display(), ctx.header),
        }
        trace!(
            "{}: {} load commands, {} bytes",
            file.display(),
            ctx.load_commands.len(),
            ctx.load_commands_size()
        );
        for lc in &ctx.load_commands {
            trace!("  command at {:#x}, {} bytes", lc.offset(), lc.size());
        }
        Ok(ctx)
    }
}

impl Inspector for MachOInspector {
    fn dependencies(&self, file: &Path) -> Result<Vec<String>> {
        Ok(Self::open(file)?.dylibs().map(str::to_string).collect())
    }

    fn rpath_entries(&self, file: &Path) -> Result<Vec<String>> {
        Ok(Self::open(file)?.rpaths().map(str::to_string).collect())
    }
}
