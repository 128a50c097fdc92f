//! Persistent key index
//!
//! Maps a cover lookup key to `(url, path)` and keeps per-key hit counters.
//! The store talks to it only through [`PersistentIndex`].

pub mod file;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use file::FileIndex;

/// Value stored under a key: where the cover came from and where it lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    /// Remote URL of the cover image
    pub url: String,
    /// Stored file, `None` once `sync` found it missing
    pub path: Option<PathBuf>,
}

impl Cover {
    pub fn new(url: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path,
        }
    }
}

/// Durable key -> [`Cover`] mapping with hit counting and bounded purge
pub trait PersistentIndex: Sized {
    /// Create a fresh, empty index at `path`, replacing whatever was there
    fn create(path: &Path) -> Result<Self>;

    /// Open an existing index at `path`
    fn open(path: &Path) -> Result<Self>;

    /// Look up a key and count a hit
    fn get(&mut self, key: &str) -> Result<Option<Cover>>;

    /// Look up a key without counting a hit
    fn peek(&self, key: &str) -> Option<Cover>;

    /// Write a key as a new entry (hits reset, newest write)
    fn set(&mut self, key: &str, cover: Cover) -> Result<()>;

    /// Rewrite the value of an existing key, keeping hits and write order
    ///
    /// Returns false if the key is absent.
    fn replace(&mut self, key: &str, cover: Cover) -> Result<bool>;

    /// Remove a key, returning whether it was present
    fn delete(&mut self, key: &str) -> Result<bool>;

    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit counter for a key
    fn hits(&self, key: &str) -> Option<u64>;

    fn set_max_len(&mut self, max_len: usize);

    /// Shrink to at most `max_len` entries, keeping higher-hit then newer entries
    ///
    /// Returns the evicted keys.
    fn purge(&mut self) -> Result<Vec<String>>;
}
