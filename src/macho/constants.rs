//! Mach-O constants used when reading load commands.

// =============================================================================
// Magic Numbers
// =============================================================================

/// 64-bit Mach-O magic (little-endian)
pub const MH_MAGIC_64: u32 = 0xFEEDFACF;

/// Universal binary magic, stored big-endian
pub const FAT_MAGIC: u32 = 0xCAFEBABE;

/// Universal binary magic with 64-bit offsets, stored big-endian
pub const FAT_MAGIC_64: u32 = 0xCAFEBABF;

// =============================================================================
// File Types
// =============================================================================

/// Executable
pub const MH_EXECUTE: u32 = 0x2;
/// Dynamically bound shared library
pub const MH_DYLIB: u32 = 0x6;
/// Bundle (plug-in)
pub const MH_BUNDLE: u32 = 0x8;

// =============================================================================
// CPU Types
// =============================================================================

/// 64-bit architecture flag
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;

/// ARM CPU type
pub const CPU_TYPE_ARM: u32 = 12;
/// ARM64 CPU type
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;

/// x86 CPU type
pub const CPU_TYPE_X86: u32 = 7;
/// x86_64 CPU type
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;

/// CPU type of the machine running the bundler.
#[cfg(target_arch = "aarch64")]
pub const CPU_TYPE_HOST: u32 = CPU_TYPE_ARM64;
/// CPU type of the machine running the bundler.
#[cfg(not(target_arch = "aarch64"))]
pub const CPU_TYPE_HOST: u32 = CPU_TYPE_X86_64;

// =============================================================================
// Load Commands
// =============================================================================

/// Flag for load commands that dyld must understand
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Load a dynamically linked shared library
pub const LC_LOAD_DYLIB: u32 = 0xC;
/// Dynamically linked shared lib identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// Load a dynamically linked shared library that is allowed to be missing
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
/// Runpath additions
pub const LC_RPATH: u32 = 0x1C | LC_REQ_DYLD;
/// Load and re-export dylib
pub const LC_REEXPORT_DYLIB: u32 = 0x1F | LC_REQ_DYLD;
/// Delay load of dylib until first use
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
/// Load upward dylib
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;

/// Returns true if `cmd` declares a library the image links against.
#[inline]
pub const fn is_dependency_command(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_LOAD_DYLIB
            | LC_LOAD_WEAK_DYLIB
            | LC_REEXPORT_DYLIB
            | LC_LAZY_LOAD_DYLIB
            | LC_LOAD_UPWARD_DYLIB
    )
}
