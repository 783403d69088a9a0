//! Mach-O context for reading the load commands that name other libraries.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;
use zerocopy::FromBytes;

use super::constants::*;
use super::structs::*;
use crate::error::{Error, Result};
use crate::util::{c_string_at, read_u32_be_at, read_u64_be_at};

// =============================================================================
// Load Command Info
// =============================================================================

/// Parsed load command information.
///
/// Only the commands that carry library paths are decoded; everything else is
/// kept as `Unknown` so offsets and sizes stay available.
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Variants are self-documenting via names
pub enum LoadCommandInfo {
    Dylib {
        command: DylibCommand,
        name: String,
        offset: usize,
    },
    Rpath {
        command: RpathCommand,
        path: String,
        offset: usize,
    },
    Unknown {
        cmd: u32,
        cmdsize: u32,
        offset: usize,
    },
}

impl LoadCommandInfo {
    /// Returns the load command offset.
    pub fn offset(&self) -> usize {
        match self {
            LoadCommandInfo::Dylib { offset, .. } => *offset,
            LoadCommandInfo::Rpath { offset, .. } => *offset,
            LoadCommandInfo::Unknown { offset, .. } => *offset,
        }
    }

    /// Returns the load command size.
    pub fn size(&self) -> u32 {
        match self {
            LoadCommandInfo::Dylib { command, .. } => command.cmdsize,
            LoadCommandInfo::Rpath { command, .. } => command.cmdsize,
            LoadCommandInfo::Unknown { cmdsize, .. } => *cmdsize,
        }
    }
}

// =============================================================================
// Mach-O Context
// =============================================================================

/// The library-related view of one Mach-O image.
#[derive(Debug)]
pub struct MachOContext {
    /// The Mach-O header
    pub header: MachHeader64,
    /// Parsed load commands, in file order
    pub load_commands: Vec<LoadCommandInfo>,
}

impl MachOContext {
    /// Memory-maps and parses the Mach-O file at `path`.
    ///
    /// Universal binaries are accepted; see [`MachOContext::from_bytes`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let len = file.metadata()?.len() as usize;
        if len < MachHeader64::SIZE {
            return Err(Error::BufferTooSmall {
                needed: MachHeader64::SIZE,
                available: len,
            });
        }

        // SAFETY: the mapping is read-only and dropped before this function returns
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| Error::MemoryMap {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_bytes(&mmap)
    }

    /// Parses either a thin 64-bit Mach-O or a universal binary.
    ///
    /// For universal binaries the slice matching the host CPU is preferred,
    /// falling back to the first 64-bit slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooSmall {
                needed: 4,
                available: data.len(),
            });
        }

        match read_u32_be_at(data, 0) {
            FAT_MAGIC | FAT_MAGIC_64 => {
                let slices = fat_slices(data)?;
                let slice = slices
                    .iter()
                    .find(|s| s.cputype == CPU_TYPE_HOST)
                    .or_else(|| slices.iter().find(|s| s.cputype & CPU_ARCH_ABI64 != 0))
                    .ok_or(Error::NoMachoSlice)?;

                debug!(
                    "using {:#x} slice at {:#x} of universal binary",
                    slice.cputype, slice.offset
                );

                let start = slice.offset as usize;
                let end = start.saturating_add(slice.size as usize);
                if end > data.len() {
                    return Err(Error::BufferTooSmall {
                        needed: end,
                        available: data.len(),
                    });
                }
                Self::new(&data[start..end])
            }
            _ => Self::new(data),
        }
    }

    /// Parses a thin Mach-O image.
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.len() < MachHeader64::SIZE {
            return Err(Error::BufferTooSmall {
                needed: MachHeader64::SIZE,
                available: data.len(),
            });
        }

        let header = MachHeader64::read_from_prefix(data)
            .map_err(|_| Error::InvalidMachoMagic(0))?
            .0;

        if !header.is_valid() {
            return Err(Error::InvalidMachoMagic(header.magic));
        }

        let commands_end = MachHeader64::SIZE.saturating_add(header.sizeofcmds as usize);
        if commands_end > data.len() {
            return Err(Error::LoadCommandOverflow {
                offset: MachHeader64::SIZE,
            });
        }

        // Each command takes at least a LoadCommand header, so `ncmds` alone is not trusted.
        let capacity = (header.ncmds as usize).min(header.sizeofcmds as usize / LoadCommand::SIZE);
        let mut ctx = Self {
            header,
            load_commands: Vec::with_capacity(capacity),
        };

        ctx.parse_load_commands(data)?;

        Ok(ctx)
    }

    /// Parses all load commands.
    fn parse_load_commands(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = MachHeader64::SIZE;
        let end_offset = MachHeader64::SIZE + self.header.sizeofcmds as usize;

        for _ in 0..self.header.ncmds {
            if offset + LoadCommand::SIZE > end_offset || offset + LoadCommand::SIZE > data.len() {
                return Err(Error::LoadCommandOverflow { offset });
            }

            let lc = LoadCommand::read_from_prefix(&data[offset..])
                .map_err(|_| Error::parse(offset, "failed to parse load command"))?
                .0;

            let cmdsize = lc.cmdsize as usize;
            if cmdsize < LoadCommand::SIZE || offset + cmdsize > data.len() {
                return Err(Error::LoadCommandOverflow { offset });
            }

            let cmd_data = &data[offset..offset + cmdsize];
            self.load_commands
                .push(Self::parse_load_command(lc, cmd_data, offset)?);
            offset += cmdsize;
        }

        Ok(())
    }

    /// Parses a single load command.
    fn parse_load_command(lc: LoadCommand, data: &[u8], offset: usize) -> Result<LoadCommandInfo> {
        match lc.cmd {
            cmd if cmd == LC_ID_DYLIB || is_dependency_command(cmd) => {
                let dylib = DylibCommand::read_from_prefix(data)
                    .map_err(|_| Error::parse(offset, "failed to parse dylib command"))?
                    .0;

                Ok(LoadCommandInfo::Dylib {
                    command: dylib,
                    name: c_string_at(data, dylib.dylib.name_offset as usize),
                    offset,
                })
            }

            LC_RPATH => {
                let rpath = RpathCommand::read_from_prefix(data)
                    .map_err(|_| Error::parse(offset, "failed to parse rpath command"))?
                    .0;

                Ok(LoadCommandInfo::Rpath {
                    command: rpath,
                    path: c_string_at(data, rpath.path_offset as usize),
                    offset,
                })
            }

            cmd => Ok(LoadCommandInfo::Unknown {
                cmd,
                cmdsize: lc.cmdsize,
                offset,
            }),
        }
    }

    /// Returns the libraries this image links against, in declaration order.
    pub fn dylibs(&self) -> impl Iterator<Item = &str> {
        self.load_commands.iter().filter_map(|lc| match lc {
            LoadCommandInfo::Dylib { command, name, .. } if is_dependency_command(command.cmd) => {
                Some(name.as_str())
            }
            _ => None,
        })
    }

    /// Returns the image's own install name (`LC_ID_DYLIB`), if it has one.
    pub fn install_name(&self) -> Option<&str> {
        self.load_commands.iter().find_map(|lc| match lc {
            LoadCommandInfo::Dylib { command, name, .. } if command.cmd == LC_ID_DYLIB => {
                Some(name.as_str())
            }
            _ => None,
        })
    }

    /// Returns the declared rpath entries, in declaration order.
    pub fn rpaths(&self) -> impl Iterator<Item = &str> {
        self.load_commands.iter().filter_map(|lc| match lc {
            LoadCommandInfo::Rpath { path, .. } => Some(path.as_str()),
            _ => None,
        })
    }

    /// Returns the total size of load commands.
    pub fn load_commands_size(&self) -> usize {
        self.load_commands.iter().map(|lc| lc.size() as usize).sum()
    }
}

/// Decodes the architecture table of a universal binary.
fn fat_slices(data: &[u8]) -> Result<Vec<FatSlice>> {
    if data.len() < FatSlice::HEADER_SIZE {
        return Err(Error::BufferTooSmall {
            needed: FatSlice::HEADER_SIZE,
            available: data.len(),
        });
    }

    let is_64 = read_u32_be_at(data, 0) == FAT_MAGIC_64;
    let count = read_u32_be_at(data, 4) as usize;
    let record = if is_64 {
        FatSlice::ARCH_64_SIZE
    } else {
        FatSlice::ARCH_SIZE
    };

    let table_end = FatSlice::HEADER_SIZE + count * record;
    if table_end > data.len() {
        return Err(Error::BufferTooSmall {
            needed: table_end,
            available: data.len(),
        });
    }

    Ok((0..count)
        .map(|i| {
            let at = FatSlice::HEADER_SIZE + i * record;
            if is_64 {
                FatSlice {
                    cputype: read_u32_be_at(data, at),
                    offset: read_u64_be_at(data, at + 8),
                    size: read_u64_be_at(data, at + 16),
                }
            } else {
                FatSlice {
                    cputype: read_u32_be_at(data, at),
                    offset: read_u32_be_at(data, at + 8) as u64,
                    size: read_u32_be_at(data, at + 12) as u64,
                }
            }
        })
        .collect())
}
