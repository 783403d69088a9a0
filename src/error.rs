//! Error types for the dylib bundler.
//!
//! Every failure the bundling pipeline can hit is one variant of [`Error`]:
//! inspecting binaries, resolving their references, preparing the destination
//! directory and mutating files on disk.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for dependency collection and bundling.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==================== Mach-O Errors ====================
    #[error("invalid Mach-O magic: {0:#x}")]
    InvalidMachoMagic(u32),

    #[error("universal binary has no 64-bit Mach-O slice")]
    NoMachoSlice,

    #[error("load command at offset {offset:#x} extends beyond header")]
    LoadCommandOverflow { offset: usize },

    #[error("parse error at offset {offset:#x}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    // ==================== Collection Errors ====================
    #[error("cannot read dependencies of '{path}': {reason}")]
    InspectionFailure { path: PathBuf, reason: String },

    #[error("cannot locate library '{reference}'")]
    UnresolvedDependency { reference: String },

    // ==================== Bundling Errors ====================
    #[error("destination directory '{path}' is unavailable: {reason}")]
    DestinationUnavailable { path: PathBuf, reason: String },

    #[error("file '{path}' already exists; remove it or enable overwriting")]
    DestinationFileExists { path: PathBuf },

    #[error("`{command}` failed: {reason}")]
    MutationFailure { command: String, reason: String },
}

/// A specialized Result type for bundling operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error indicates a recoverable condition.
    ///
    /// An unresolved dependency can still be satisfied by asking for its
    /// directory again; everything else aborts the run.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnresolvedDependency { .. })
    }

    /// Creates a parse error with a formatted message.
    #[inline]
    pub fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            offset,
            reason: reason.into(),
        }
    }

    /// Wraps any error raised while reading a binary as an inspection failure.
    pub fn inspection(path: impl Into<PathBuf>, source: &Error) -> Self {
        Error::InspectionFailure {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    /// Creates a mutation failure for an external command.
    #[inline]
    pub fn mutation(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MutationFailure {
            command: command.into(),
            reason: reason.into(),
        }
    }
}
