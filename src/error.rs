//! Cover Cache Error Types
//!
//! Structured errors for cache operations. Read-path callers usually collapse
//! these into "absent" via [`crate::CoverStore::get`], everything else returns them.

use std::path::PathBuf;

/// Cover cache error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Copy failed for {path:?}: {reason}")]
    CopyFailed { path: PathBuf, reason: String },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wrap an I/O error with the path it happened on
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only means "the key is not cached"
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CacheError::NotFound("gooc.9780000000000.2".to_string());
        assert_eq!(err.to_string(), "Not found: gooc.9780000000000.2");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_filesystem_error_keeps_source() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CacheError::fs("/tmp/c/slot01", io);
        assert!(err.to_string().contains("slot01"));
        assert!(err.source().is_some());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_invalid_entry_display() {
        let err = CacheError::InvalidEntry("empty url".to_string());
        assert_eq!(err.to_string(), "Invalid entry: empty url");
        assert!(!err.is_not_found());
    }
}
