//! Mach-O binary structures.
//!
//! These structures match the on-disk format of Mach-O files.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::*;

// =============================================================================
// Header Structures
// =============================================================================

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader64 {
    /// Magic number (MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

impl MachHeader64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;

    /// Returns true if this is a valid 64-bit Mach-O header.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MH_MAGIC_64
    }

    /// Returns true if this is a dylib.
    #[inline]
    pub fn is_dylib(&self) -> bool {
        self.filetype == MH_DYLIB
    }

    /// Returns the architecture as a string.
    pub fn arch_name(&self) -> &'static str {
        match self.cputype {
            CPU_TYPE_ARM64 => "arm64",
            CPU_TYPE_X86_64 => "x86_64",
            CPU_TYPE_ARM => "arm",
            CPU_TYPE_X86 => "i386",
            _ => "unknown",
        }
    }

    /// Returns a short name for the file type.
    pub fn kind_name(&self) -> &'static str {
        match self.filetype {
            MH_EXECUTE => "executable",
            MH_DYLIB => "dylib",
            MH_BUNDLE => "bundle",
            _ => "other",
        }
    }
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

// =============================================================================
// Dylib Commands
// =============================================================================

/// Dylib reference.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dylib {
    /// Library's path name offset
    pub name_offset: u32,
    /// Library's build timestamp
    pub timestamp: u32,
    /// Library's current version number
    pub current_version: u32,
    /// Library's compatibility version number
    pub compatibility_version: u32,
}

/// Dylib load command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DylibCommand {
    /// LC_LOAD_DYLIB, LC_ID_DYLIB, etc.
    pub cmd: u32,
    /// Total size (includes path string)
    pub cmdsize: u32,
    /// Library identification
    pub dylib: Dylib,
}

impl DylibCommand {
    /// Minimum size of this command (without path string).
    pub const SIZE: usize = 24;
}

/// Rpath load command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RpathCommand {
    /// LC_RPATH
    pub cmd: u32,
    /// Total size (includes path string)
    pub cmdsize: u32,
    /// Offset of the path string from the start of the command
    pub path_offset: u32,
}

impl RpathCommand {
    /// Minimum size of this command (without path string).
    pub const SIZE: usize = 12;
}

// =============================================================================
// Universal Binary Structures
// =============================================================================

/// One architecture slice of a universal binary, with offsets widened to 64 bits.
///
/// The on-disk `fat_arch` records are big-endian and come in 32- and 64-bit
/// flavours, so they are decoded by hand rather than transmuted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatSlice {
    /// CPU type of the slice
    pub cputype: u32,
    /// File offset of the slice
    pub offset: u64,
    /// Size of the slice in bytes
    pub size: u64,
}

impl FatSlice {
    /// Size of the fat header (magic + arch count).
    pub const HEADER_SIZE: usize = 8;
    /// Size of a 32-bit `fat_arch` record.
    pub const ARCH_SIZE: usize = 20;
    /// Size of a `fat_arch_64` record.
    pub const ARCH_64_SIZE: usize = 32;
}

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for MachHeader64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachO {{ arch: {}, type: {}, cmds: {} }}",
            self.arch_name(),
            self.kind_name(),
            self.ncmds
        )
    }
}
