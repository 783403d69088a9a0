//! Classification of raw dependency reference strings.

/// Marker for references searched along the loader's rpath list.
pub const RPATH_MARKER: &str = "@rpath/";
/// Marker for references relative to the referencing binary.
pub const LOADER_PATH_MARKER: &str = "@loader_path/";
/// Marker for references relative to the main executable.
pub const EXECUTABLE_PATH_MARKER: &str = "@executable_path/";

/// A dependency reference as embedded in a binary, parsed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// A plain filesystem path (possibly relative or a bare file name)
    Absolute(&'a str),
    /// `@rpath/<suffix>`
    Rpath {
        /// The full reference
        raw: &'a str,
        /// Everything after the marker
        suffix: &'a str,
    },
    /// `@loader_path/<suffix>`
    LoaderPath {
        /// The full reference
        raw: &'a str,
        /// Everything after the marker
        suffix: &'a str,
    },
    /// `@executable_path/<suffix>`; already relocatable, never bundled
    ExecutablePath(&'a str),
}

impl<'a> Reference<'a> {
    /// Parses a raw reference string.
    pub fn parse(raw: &'a str) -> Self {
        if let Some(suffix) = raw.strip_prefix(RPATH_MARKER) {
            Reference::Rpath { raw, suffix }
        } else if let Some(suffix) = raw.strip_prefix(LOADER_PATH_MARKER) {
            Reference::LoaderPath { raw, suffix }
        } else if raw.starts_with(EXECUTABLE_PATH_MARKER) {
            Reference::ExecutablePath(raw)
        } else {
            Reference::Absolute(raw)
        }
    }

    /// The reference exactly as it appears in the binary.
    pub fn as_str(&self) -> &'a str {
        match *self {
            Reference::Absolute(raw) | Reference::ExecutablePath(raw) => raw,
            Reference::Rpath { raw, .. } | Reference::LoaderPath { raw, .. } => raw,
        }
    }

    /// The library sub-path after the marker, for rpath and loader-path references.
    pub fn suffix(&self) -> Option<&'a str> {
        match *self {
            Reference::Rpath { suffix, .. } | Reference::LoaderPath { suffix, .. } => Some(suffix),
            _ => None,
        }
    }

    /// Returns true for references that must be searched for.
    pub fn is_relocatable(&self) -> bool {
        self.suffix().is_some()
    }

    /// Returns true if the reference points inside a framework bundle.
    pub fn is_framework(&self) -> bool {
        self.as_str().contains(".framework")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(
            Reference::parse("/opt/lib/libX.dylib"),
            Reference::Absolute("/opt/lib/libX.dylib")
        );
        assert_eq!(
            Reference::parse("@rpath/sub/libY.dylib"),
            Reference::Rpath {
                raw: "@rpath/sub/libY.dylib",
                suffix: "sub/libY.dylib"
            }
        );
        assert_eq!(
            Reference::parse("@loader_path/../lib/libZ.dylib").suffix(),
            Some("../lib/libZ.dylib")
        );
        assert_eq!(
            Reference::parse("@executable_path/../libs/libZ.dylib"),
            Reference::ExecutablePath("@executable_path/../libs/libZ.dylib")
        );
    }

    #[test]
    fn test_markers_must_lead() {
        let reference = Reference::parse("/opt/@rpath/libX.dylib");
        assert!(!reference.is_relocatable());
        assert_eq!(reference.as_str(), "/opt/@rpath/libX.dylib");
    }

    #[test]
    fn test_framework_detection() {
        assert!(Reference::parse("@rpath/Qt.framework/Versions/5/Qt").is_framework());
        assert!(!Reference::parse("@rpath/libQt.dylib").is_framework());
    }
}
