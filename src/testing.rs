//! Fixtures shared by the unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zerocopy::IntoBytes;

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::macho::*;
use crate::planner::{BundlePlanner, Operation};
use crate::resolver::{DeclinePrompt, PathResolver};
use crate::settings::Settings;
use crate::tools::{Filesystem, Inspector, Patcher, Signer, Tools};

/// Creates an empty file at `path`, along with its parent directories.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"").unwrap();
}

// =============================================================================
// Mach-O Images
// =============================================================================

/// Assembles small 64-bit Mach-O images in memory.
pub struct MachOBuilder {
    cputype: u32,
    filetype: u32,
    commands: Vec<Vec<u8>>,
}

impl MachOBuilder {
    /// A dylib whose install name is `id`.
    pub fn dylib(id: &str) -> Self {
        Self {
            cputype: CPU_TYPE_HOST,
            filetype: MH_DYLIB,
            commands: Vec::new(),
        }
        .link_with(LC_ID_DYLIB, id)
    }

    /// An executable with no load commands yet.
    pub fn executable() -> Self {
        Self {
            cputype: CPU_TYPE_HOST,
            filetype: MH_EXECUTE,
            commands: Vec::new(),
        }
    }

    pub fn cpu(mut self, cputype: u32) -> Self {
        self.cputype = cputype;
        self
    }

    pub fn link(self, name: &str) -> Self {
        self.link_with(LC_LOAD_DYLIB, name)
    }

    pub fn link_with(mut self, cmd: u32, name: &str) -> Self {
        let size = padded(DylibCommand::SIZE + name.len() + 1);
        let command = DylibCommand {
            cmd,
            cmdsize: size as u32,
            dylib: Dylib {
                name_offset: DylibCommand::SIZE as u32,
                timestamp: 2,
                current_version: 0x10000,
                compatibility_version: 0x10000,
            },
        };
        self.commands
            .push(with_string(command.as_bytes(), name, size));
        self
    }

    pub fn rpath(mut self, path: &str) -> Self {
        let size = padded(RpathCommand::SIZE + path.len() + 1);
        let command = RpathCommand {
            cmd: LC_RPATH,
            cmdsize: size as u32,
            path_offset: RpathCommand::SIZE as u32,
        };
        self.commands
            .push(with_string(command.as_bytes(), path, size));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: self.cputype,
            cpusubtype: 0,
            filetype: self.filetype,
            ncmds: self.commands.len() as u32,
            sizeofcmds: self.commands.iter().map(Vec::len).sum::<usize>() as u32,
            flags: 0,
            reserved: 0,
        };
        let mut data = header.as_bytes().to_vec();
        for command in self.commands {
            data.extend(command);
        }
        data
    }
}

fn padded(len: usize) -> usize {
    (len + 7) & !7
}

fn with_string(fixed: &[u8], s: &str, size: usize) -> Vec<u8> {
    let mut bytes = fixed.to_vec();
    bytes.extend_from_slice(s.as_bytes());
    bytes.resize(size, 0);
    bytes
}

/// Wraps thin images into a universal binary with a 32-bit arch table.
pub fn fat_binary(slices: &[(u32, Vec<u8>)]) -> Vec<u8> {
    const ALIGN: usize = 0x1000;

    let mut data = Vec::new();
    data.extend(FAT_MAGIC.to_be_bytes());
    data.extend((slices.len() as u32).to_be_bytes());

    let mut offset = ALIGN;
    let mut placed = Vec::new();
    for (cputype, image) in slices {
        for field in [*cputype, 0, offset as u32, image.len() as u32, 12] {
            data.extend(field.to_be_bytes());
        }
        placed.push((offset, image));
        offset = (offset + image.len()).div_ceil(ALIGN) * ALIGN;
    }

    for (offset, image) in placed {
        data.resize(offset, 0);
        data.extend_from_slice(image);
    }
    data
}

// =============================================================================
// In-Memory Host
// =============================================================================

/// Load commands of a binary held by [`FakeHost`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeBinary {
    pub identity: Option<String>,
    pub dependencies: Vec<String>,
    pub rpaths: Vec<String>,
}

/// Scripted collaborators over an in-memory set of binaries.
///
/// Every mutating call is appended to [`FakeHost::log`] as a short
/// command line, so tests can assert on ordering.
#[derive(Default)]
pub struct FakeHost {
    binaries: RefCell<BTreeMap<PathBuf, FakeBinary>>,
    directories: RefCell<BTreeSet<PathBuf>>,
    failing_signatures: RefCell<HashSet<PathBuf>>,
    log: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binary with the given references.
    pub fn add_binary(&self, path: impl Into<PathBuf>, dependencies: &[&str], rpaths: &[&str]) {
        self.binaries.borrow_mut().insert(
            path.into(),
            FakeBinary {
                identity: None,
                dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
                rpaths: rpaths.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    /// Registers an existing directory.
    pub fn add_directory(&self, path: impl Into<PathBuf>) {
        self.directories.borrow_mut().insert(path.into());
    }

    /// Makes signing `path` fail.
    pub fn fail_signing(&self, path: impl Into<PathBuf>) {
        self.failing_signatures.borrow_mut().insert(path.into());
    }

    pub fn binary(&self, path: &Path) -> Option<FakeBinary> {
        self.binaries.borrow().get(path).cloned()
    }

    /// All binaries under `dir`, keyed by file name.
    pub fn binaries_in(&self, dir: &Path) -> BTreeMap<String, FakeBinary> {
        self.binaries
            .borrow()
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .filter_map(|(path, binary)| {
                Some((path.file_name()?.to_string_lossy().into_owned(), binary.clone()))
            })
            .collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    fn record(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    fn patch(
        &self,
        file: &Path,
        command: String,
        f: impl FnOnce(&mut FakeBinary) -> std::result::Result<(), String>,
    ) -> Result<()> {
        let mut binaries = self.binaries.borrow_mut();
        let binary = binaries
            .get_mut(file)
            .ok_or_else(|| Error::mutation(command.clone(), "no such file"))?;
        f(binary).map_err(|reason| Error::mutation(command.clone(), reason))?;
        drop(binaries);
        self.record(command);
        Ok(())
    }
}

impl Inspector for FakeHost {
    fn dependencies(&self, file: &Path) -> Result<Vec<String>> {
        self.binary(file)
            .map(|b| b.dependencies)
            .ok_or_else(|| Error::InspectionFailure {
                path: file.to_path_buf(),
                reason: "not a scripted binary".into(),
            })
    }

    fn rpath_entries(&self, file: &Path) -> Result<Vec<String>> {
        self.binary(file)
            .map(|b| b.rpaths)
            .ok_or_else(|| Error::InspectionFailure {
                path: file.to_path_buf(),
                reason: "not a scripted binary".into(),
            })
    }
}

impl Patcher for FakeHost {
    fn rewrite_reference(&self, file: &Path, old: &str, new: &str) -> Result<()> {
        let command = format!("change {} {} {}", old, new, file.display());
        self.patch(file, command, |b| {
            for dep in b.dependencies.iter_mut().filter(|d| d.as_str() == old) {
                *dep = new.to_string();
            }
            Ok(())
        })
    }

    fn rewrite_rpath(&self, file: &Path, old: &str, new: &str) -> Result<()> {
        let command = format!("rpath {} {} {}", old, new, file.display());
        self.patch(file, command, |b| {
            if b.rpaths.iter().any(|r| r == new) {
                return Err(format!("would duplicate path, file already has LC_RPATH for: {new}"));
            }
            let rpath = b
                .rpaths
                .iter_mut()
                .find(|r| r.as_str() == old)
                .ok_or_else(|| format!("no LC_RPATH load command with path: {old}"))?;
            *rpath = new.to_string();
            Ok(())
        })
    }

    fn set_identity(&self, file: &Path, identity: &str) -> Result<()> {
        let command = format!("id {} {}", identity, file.display());
        self.patch(file, command, |b| {
            b.identity = Some(identity.to_string());
            Ok(())
        })
    }
}

impl Signer for FakeHost {
    fn sign(&self, file: &Path) -> Result<()> {
        let command = format!("sign {}", file.display());
        if self.failing_signatures.borrow().contains(file) {
            return Err(Error::mutation(command, "invalid signature"));
        }
        self.record(command);
        Ok(())
    }
}

impl Filesystem for FakeHost {
    fn exists(&self, path: &Path) -> bool {
        self.binaries.borrow().contains_key(path) || self.directories.borrow().contains(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let command = format!("cp {} {}", from.display(), to.display());
        let binary = self
            .binary(from)
            .ok_or_else(|| Error::mutation(command.clone(), "no such file"))?;
        self.binaries.borrow_mut().insert(to.to_path_buf(), binary);
        self.record(command);
        Ok(())
    }

    fn make_writable(&self, path: &Path) -> Result<()> {
        self.record(format!("chmod +w {}", path.display()));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.directories.borrow_mut().insert(path.to_path_buf());
        self.record(format!("mkdir -p {}", path.display()));
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.directories.borrow_mut().retain(|d| !d.starts_with(path));
        self.binaries.borrow_mut().retain(|f, _| !f.starts_with(path));
        self.record(format!("rm -r {}", path.display()));
        Ok(())
    }
}

// =============================================================================
// Workspace
// =============================================================================

/// A canonical temporary directory whose binaries are scripted in a [`FakeHost`].
///
/// Files exist on disk so references resolve; their load commands live in
/// the host.
pub struct Workspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub host: FakeHost,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        Self {
            _dir: dir,
            root,
            host: FakeHost::new(),
        }
    }

    /// Absolute path string of `rel`.
    pub fn path(&self, rel: &str) -> String {
        self.root.join(rel).to_string_lossy().into_owned()
    }

    /// Creates `rel` on disk and scripts its load commands.
    pub fn binary(&self, rel: &str, dependencies: &[&str], rpaths: &[&str]) -> PathBuf {
        let path = self.root.join(rel);
        touch(&path);
        self.host.add_binary(&path, dependencies, rpaths);
        path
    }

    pub fn collect(&self, settings: &Settings) -> Result<DependencyGraph> {
        let mut resolver = PathResolver::new(settings, DeclinePrompt);
        DependencyGraph::collect(settings, &self.host, &mut resolver)
    }

    /// Collects and plans, matching bare file names if resolution needed it.
    pub fn plan(&self, settings: &Settings) -> Result<Vec<Operation>> {
        let mut resolver = PathResolver::new(settings, DeclinePrompt);
        let graph = DependencyGraph::collect(settings, &self.host, &mut resolver)?;
        BundlePlanner::new(settings, &graph)
            .with_bare_filename_matching(resolver.missing_prefixes())
            .plan(&self.host)
    }

    pub fn tools(&self) -> Tools<'_> {
        Tools {
            filesystem: &self.host,
            patcher: &self.host,
            signer: &self.host,
        }
    }
}
