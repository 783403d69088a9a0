//! Single filesystem or binary mutations.

use std::fmt;
use std::path::PathBuf;

/// One step of a bundling plan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Operation {
    /// Erase the destination directory
    RemoveDirectory(PathBuf),
    /// Create the destination directory
    CreateDirectory(PathBuf),
    /// Copy a file; unless `overwrite` is set an existing target is an error
    Copy {
        from: PathBuf,
        to: PathBuf,
        overwrite: bool,
    },
    /// Give the owner write access
    MakeWritable(PathBuf),
    /// Set a library's own install name
    SetIdentity { file: PathBuf, identity: String },
    /// Point a dependency reference somewhere else
    ChangeReference {
        file: PathBuf,
        old: String,
        new: String,
    },
    /// Replace an rpath entry
    RewriteRpath {
        file: PathBuf,
        old: String,
        new: String,
    },
    /// Re-apply an ad-hoc code signature
    Sign(PathBuf),
}

impl Operation {
    /// Returns true for operations that rewrite a binary's load commands.
    pub fn is_patch(&self) -> bool {
        matches!(
            self,
            Operation::SetIdentity { .. }
                | Operation::ChangeReference { .. }
                | Operation::RewriteRpath { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::RemoveDirectory(dir) => write!(f, "rm -r {}", dir.display()),
            Operation::CreateDirectory(dir) => write!(f, "mkdir -p {}", dir.display()),
            Operation::Copy { from, to, .. } => write!(f, "cp {} {}", from.display(), to.display()),
            Operation::MakeWritable(file) => write!(f, "chmod +w {}", file.display()),
            Operation::SetIdentity { file, identity } => {
                write!(f, "install_name_tool -id {} {}", identity, file.display())
            }
            Operation::ChangeReference { file, old, new } => {
                write!(f, "install_name_tool -change {} {} {}", old, new, file.display())
            }
            Operation::RewriteRpath { file, old, new } => {
                write!(f, "install_name_tool -rpath {} {} {}", old, new, file.display())
            }
            Operation::Sign(file) => write!(f, "codesign {}", file.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let op = Operation::ChangeReference {
            file: PathBuf::from("libs/libY.dylib"),
            old: "@rpath/libX.dylib".into(),
            new: "@executable_path/../libs/libX.dylib".into(),
        };
        assert_eq!(
            op.to_string(),
            "install_name_tool -change @rpath/libX.dylib @executable_path/../libs/libX.dylib libs/libY.dylib"
        );
        assert!(op.is_patch());
        assert!(!Operation::Sign(PathBuf::from("A")).is_patch());
        assert_eq!(
            Operation::CreateDirectory(PathBuf::from("libs/")).to_string(),
            "mkdir -p libs/"
        );
    }
}
