//! Slot directories
//!
//! Cached files are spread over `slot00`..`slotNN` under the cache root.
//! Placement is a uniform random pick: it balances directory sizes and says
//! nothing about which slot a given key ends up in.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Directory name for slot `n`
pub fn slot_name(n: usize) -> String {
    format!("slot{:02}", n)
}

/// The fixed set of slot directories under a cache root
#[derive(Debug, Clone)]
pub struct Slots {
    root: PathBuf,
    count: usize,
}

impl Slots {
    pub fn new(root: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            root: root.into(),
            count,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Path of slot `n`
    pub fn dir(&self, n: usize) -> PathBuf {
        self.root.join(slot_name(n))
    }

    /// All slot paths in order
    pub fn dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (0..self.count).map(move |n| self.dir(n))
    }

    /// Every slot, starting at a uniformly random one and wrapping around
    pub fn candidates(&self) -> Vec<PathBuf> {
        let count = self.count.max(1);
        let start = rand::thread_rng().gen_range(0..count);
        (0..count).map(|i| self.dir((start + i) % count)).collect()
    }

    /// Whether `path` sits directly inside one of the slots
    pub fn contains(&self, path: &Path) -> bool {
        path.parent()
            .map(|parent| self.dirs().any(|dir| dir == parent))
            .unwrap_or(false)
    }

    /// Create every missing slot directory
    ///
    /// # Returns
    /// Number of directories that had to be created
    pub fn create_all(&self) -> Result<usize> {
        let mut created = 0;
        for dir in self.dirs() {
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(&dir).map_err(|e| CacheError::fs(&dir, e))?;
            debug!(slot = %dir.display(), "Created slot directory");
            created += 1;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_names_are_zero_padded() {
        assert_eq!(slot_name(0), "slot00");
        assert_eq!(slot_name(9), "slot09");
        assert_eq!(slot_name(10), "slot10");
    }

    #[test]
    fn test_candidates_cover_every_slot_once() {
        let slots = Slots::new("/tmp/c", 10);
        let all: Vec<PathBuf> = slots.dirs().collect();
        assert_eq!(all.len(), slots.count());

        for _ in 0..50 {
            let mut picked = slots.candidates();
            assert_eq!(picked.len(), 10);
            picked.sort();
            assert_eq!(picked, all);
        }
    }

    #[test]
    fn test_candidates_wrap_in_order() {
        let slots = Slots::new("/tmp/c", 3);
        let picked = slots.candidates();
        let first = slots.dirs().position(|d| d == picked[0]).unwrap();
        assert_eq!(picked[1], slots.dir((first + 1) % 3));
        assert_eq!(picked[2], slots.dir((first + 2) % 3));
    }

    #[test]
    fn test_contains() {
        let slots = Slots::new("/tmp/c", 3);
        assert!(slots.contains(Path::new("/tmp/c/slot02/cover.jpg")));
        assert!(!slots.contains(Path::new("/tmp/c/slot03/cover.jpg")));
        assert!(!slots.contains(Path::new("/tmp/c/.index")));
    }

    #[test]
    fn test_create_all_only_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let slots = Slots::new(dir.path(), 4);

        assert_eq!(slots.create_all().unwrap(), 4);
        fs::remove_dir(slots.dir(2)).unwrap();
        assert_eq!(slots.create_all().unwrap(), 1);
        assert!(slots.dirs().all(|d| d.is_dir()));
    }
}
