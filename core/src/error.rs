//! Error types for Tickbook Core.
//!
//! Parsing never fails: unrecognised markdown is skipped rather than rejected.
//! The only failures the core reports come from the filesystem and from
//! toggling a line that carries no checkbox marker.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised when the core touches the filesystem.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Reading, writing or enumerating a path failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The scan root does not exist or is not a directory.
    #[error("notes directory does not exist: {0}")]
    RootNotFound(PathBuf),
}

impl CoreError {
    /// Wraps an I/O error together with the path that caused it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while toggling a checkbox in a file.
///
/// "Not found" is deliberately absent: a missing target is reported as
/// [`ToggleOutcome::NotFound`](crate::toggle::ToggleOutcome::NotFound), since
/// the file may have been edited between parse and toggle.
#[derive(Error, Debug)]
pub enum ToggleError {
    /// The addressed line exists but holds no `- [ ]` / `- [x]` marker.
    #[error("line {line_number} of {path} is not a checkbox line")]
    MalformedLine {
        /// File that was addressed.
        path: PathBuf,
        /// 1-based line number that was addressed.
        line_number: usize,
    },

    /// The file could not be read or written.
    #[error(transparent)]
    Io(#[from] CoreError),
}

impl ToggleError {
    /// Returns `true` if the caller addressed a line that is not a checkbox.
    #[must_use]
    pub fn is_malformed_line(&self) -> bool {
        matches!(self, Self::MalformedLine { .. })
    }
}

/// A specialized `Result` type for core filesystem operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_includes_path() {
        let err = CoreError::io(
            "/notes/todo.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "I/O error on /notes/todo.md: denied");
    }

    #[test]
    fn root_not_found_display() {
        let err = CoreError::RootNotFound(PathBuf::from("/missing"));
        assert_eq!(err.to_string(), "notes directory does not exist: /missing");
    }

    #[test]
    fn malformed_line_display() {
        let err = ToggleError::MalformedLine {
            path: PathBuf::from("/notes/a.md"),
            line_number: 3,
        };
        assert_eq!(err.to_string(), "line 3 of /notes/a.md is not a checkbox line");
        assert!(err.is_malformed_line());
    }

    #[test]
    fn io_converts_into_toggle_error() {
        let core = CoreError::io(
            "/x.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let err: ToggleError = core.into();
        assert!(matches!(err, ToggleError::Io(_)));
        assert!(!err.is_malformed_line());
        assert_eq!(err.to_string(), "I/O error on /x.md: gone");
    }
}
