//! Tailing error types.

use std::path::PathBuf;

/// Errors that can occur while tailing an output log.
#[derive(thiserror::Error, Debug)]
pub enum TailError {
    /// Output log disappeared after it was opened.
    #[error("Output log deleted: {0}")]
    FileDeleted(PathBuf),

    /// Permission denied accessing the log.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TailError {
    pub(crate) fn from_io(path: &std::path::Path, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::FileDeleted(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_deleted_display() {
        let err = TailError::FileDeleted(PathBuf::from("/run/wf.dag.dagman.out"));
        assert_eq!(err.to_string(), "Output log deleted: /run/wf.dag.dagman.out");
    }

    #[test]
    fn test_from_io_maps_kinds() {
        let path = PathBuf::from("/x");
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(TailError::from_io(&path, missing), TailError::FileDeleted(_)));
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(TailError::from_io(&path, denied), TailError::PermissionDenied(_)));
        let other = std::io::Error::new(std::io::ErrorKind::Other, "?");
        assert!(matches!(TailError::from_io(&path, other), TailError::Io(_)));
    }
}
