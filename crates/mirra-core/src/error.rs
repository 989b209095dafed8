//! Error types for `mirra-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

use std::io;
use std::path::{Path, PathBuf};

/// Unified error type for all core operations.
///
/// The first five variants form the recovery taxonomy: callers branch on
/// them to decide between recovery, surfacing, or re-initialisation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The external resource behind a handle no longer exists.
    ///
    /// Triggers the recovery protocol.
    #[error("resource vanished: {0}")]
    ResourceVanished(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The destination name is already taken.
    #[error("name collision: {0}")]
    NameCollision(PathBuf),

    /// A directory delete was attempted on a non-empty directory.
    #[error("directory not empty: {0}")]
    NotEmpty(PathBuf),

    /// Even the root directory is gone; the engine must be re-opened.
    #[error("root is no longer valid: {0}")]
    Unrecoverable(PathBuf),

    /// The path is not known to the in-memory tree.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// A file or directory name is invalid (empty, contains path separators, etc.).
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The destination of a move cannot hold the source (e.g. a directory
    /// moved into its own subtree).
    #[error("invalid target: {0}")]
    InvalidTarget(PathBuf),

    /// The operation log is empty.
    #[error("nothing to undo")]
    NothingToUndo,

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Wraps another error with the action that was being attempted.
    #[error("{action} failed: {source}")]
    Action {
        action: String,
        #[source]
        source: Box<CoreError>,
    },

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Maps an I/O error raised while touching `path` onto the taxonomy.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::ResourceVanished(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => Self::NameCollision(path.to_path_buf()),
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Attaches the attempted action to this error.
    pub fn during(self, action: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping any action context.
    pub fn root(&self) -> &CoreError {
        match self {
            Self::Action { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` for errors that should trigger the recovery protocol.
    pub fn is_vanished(&self) -> bool {
        matches!(self.root(), Self::ResourceVanished(_))
    }
}

/// Convenience alias used throughout `mirra-core`.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_vanished_displays_path() {
        let err = CoreError::ResourceVanished(PathBuf::from("photos/2024"));
        assert_eq!(err.to_string(), "resource vanished: photos/2024");
    }

    #[test]
    fn permission_denied_displays_path() {
        let err = CoreError::PermissionDenied(PathBuf::from("/secret"));
        assert_eq!(err.to_string(), "permission denied: /secret");
    }

    #[test]
    fn from_io_maps_not_found_to_vanished() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = CoreError::from_io(io_err, Path::new("/a.jpg"));
        assert!(matches!(err, CoreError::ResourceVanished(ref p) if p == Path::new("/a.jpg")));
    }

    #[test]
    fn from_io_maps_permission_denied() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err = CoreError::from_io(io_err, Path::new("/locked"));
        assert!(matches!(err, CoreError::PermissionDenied(_)));
    }

    #[test]
    fn from_io_keeps_other_kinds_as_io() {
        let io_err = io::Error::new(io::ErrorKind::Interrupted, "eintr");
        let err = CoreError::from_io(io_err, Path::new("/x"));
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn action_context_is_displayed_and_unwrapped() {
        let err = CoreError::ResourceVanished(PathBuf::from("photos/a.jpg")).during("delete");
        assert_eq!(
            err.to_string(),
            "delete failed: resource vanished: photos/a.jpg"
        );
        assert!(err.is_vanished());
        assert!(matches!(err.root(), CoreError::ResourceVanished(_)));
    }

    #[test]
    fn nested_action_context_unwraps_to_root() {
        let err = CoreError::NotEmpty(PathBuf::from("d"))
            .during("delete")
            .during("batch");
        assert!(matches!(err.root(), CoreError::NotEmpty(_)));
        assert!(!err.is_vanished());
    }

    #[test]
    fn nothing_to_undo_displays_message() {
        assert_eq!(CoreError::NothingToUndo.to_string(), "nothing to undo");
    }

    #[test]
    fn io_error_from_std() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
        assert!(core_err.to_string().contains("boom"));
    }
}
