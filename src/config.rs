//! Cache configuration
//!
//! Size bound, slot count and root directory are per-instance settings.

use std::path::PathBuf;

use crate::error::{CacheError, Result};

/// Default index size bound that triggers a purge
pub const DEFAULT_MAX_LEN: usize = 3000;

/// Default number of slot directories
pub const DEFAULT_NSLOTS: usize = 10;

/// File name of the index inside the cache root
pub const INDEX_FILE_NAME: &str = ".index";

/// Configuration for a [`crate::CoverStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache root directory (holds the index and the slot directories)
    pub root: PathBuf,
    /// Maximum number of index entries kept by a purge
    pub max_len: usize,
    /// Number of slot directories files are spread over
    pub nslots: usize,
    /// Wipe and recreate the cache when the index cannot be read at open time
    pub reset_on_corrupt_index: bool,
}

impl CacheConfig {
    /// Create a configuration with default bounds for the given root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_len: DEFAULT_MAX_LEN,
            nslots: DEFAULT_NSLOTS,
            reset_on_corrupt_index: true,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_nslots(mut self, nslots: usize) -> Self {
        self.nslots = nslots;
        self
    }

    pub fn with_reset_on_corrupt_index(mut self, reset: bool) -> Self {
        self.reset_on_corrupt_index = reset;
        self
    }

    /// Default configuration overlaid with `COVERS_CACHE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Overlay variables from an arbitrary lookup onto the defaults
    ///
    /// Recognized names: `COVERS_CACHE_DIR`, `COVERS_CACHE_MAXLEN`, `COVERS_CACHE_NSLOTS`.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("COVERS_CACHE_DIR") {
            config.root = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("COVERS_CACHE_MAXLEN") {
            config.max_len = parse_count("COVERS_CACHE_MAXLEN", &raw)?;
        }
        if let Some(raw) = lookup("COVERS_CACHE_NSLOTS") {
            config.nslots = parse_count("COVERS_CACHE_NSLOTS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.nslots == 0 {
            return Err(CacheError::InvalidConfig(
                "nslots must be at least 1".to_string(),
            ));
        }
        if self.max_len == 0 {
            return Err(CacheError::InvalidConfig(
                "max_len must be at least 1".to_string(),
            ));
        }
        if self.root.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache root must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the index file
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    /// Whether the root is a non-empty directory without an index
    ///
    /// Opening such a root wipes it, so callers that did not create it should
    /// check first.
    pub fn root_is_unindexed(&self) -> bool {
        if self.index_path().is_file() {
            return false;
        }
        std::fs::read_dir(&self.root)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("covers");
        Self::new(root)
    }
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| CacheError::InvalidConfig(format!("{}={:?}: {}", name, raw, e)))
}
