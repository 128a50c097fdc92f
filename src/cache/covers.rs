//! Cover Store
//!
//! Copies downloaded cover images into slot directories and records
//! `key -> (url, path)` in the index. Files are always materialized before the
//! index is told about them, so the index never points at a file that was not
//! written. Anything left behind by a failed commit is reclaimed by `sync`.

use std::collections::{BTreeSet, HashSet};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::slots::Slots;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::index::{Cover, FileIndex, PersistentIndex};

/// Disk cache of cover images keyed by lookup identifier
///
/// Single writer per cache root: callers sharing a root across threads or
/// processes must serialize access themselves.
pub struct CoverStore<I: PersistentIndex = FileIndex> {
    pub(super) config: CacheConfig,
    pub(super) index: I,
    pub(super) slots: Slots,
    /// Successful lookups since open
    pub(super) hits: u64,
    /// Failed lookups since open
    pub(super) misses: u64,
}

impl CoverStore<FileIndex> {
    /// Open (or create) a cache backed by the JSON file index
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with_index(config)
    }
}

impl<I: PersistentIndex> CoverStore<I> {
    /// Open (or create) a cache with any index implementation
    ///
    /// A missing index means a fresh cache is made. An unreadable index resets
    /// the cache when `reset_on_corrupt_index` is set, otherwise the error is
    /// returned and nothing on disk is touched. If the index holds more than
    /// `max_len` entries it is purged before returning.
    pub fn open_with_index(mut config: CacheConfig) -> Result<Self> {
        config.validate()?;
        // Stored paths must not depend on the working directory or on how the
        // root was spelled
        fs::create_dir_all(&config.root).map_err(|e| CacheError::fs(&config.root, e))?;
        config.root =
            fs::canonicalize(&config.root).map_err(|e| CacheError::fs(&config.root, e))?;

        let index_path = config.index_path();
        let index = if index_path.is_file() {
            match I::open(&index_path) {
                Ok(index) => index,
                Err(CacheError::IndexUnavailable(reason)) if config.reset_on_corrupt_index => {
                    warn!(
                        root = %config.root.display(),
                        reason = %reason,
                        "Index unreadable, resetting cover cache"
                    );
                    build_fresh(&config)?
                }
                Err(e) => return Err(e),
            }
        } else {
            build_fresh(&config)?
        };

        let slots = Slots::new(&config.root, config.nslots);
        let mut store = Self {
            config,
            index,
            slots,
            hits: 0,
            misses: 0,
        };
        store.index.set_max_len(store.config.max_len);

        let created = store.slots.create_all()?;
        if created > 0 {
            warn!(created = created, "Recreated missing slot directories");
        }

        if store.index.len() > store.config.max_len {
            if let Err(e) = store.purge() {
                warn!(error = %e, "Purge on open failed, cache stays oversized");
            }
        }

        info!(
            root = %store.config.root.display(),
            entries = store.index.len(),
            max_len = store.config.max_len,
            nslots = store.config.nslots,
            "Cover cache opened"
        );

        Ok(store)
    }

    /// Wipe the cache root and start over with an empty index and empty slots
    ///
    /// This is the recovery action for a cache whose on-disk structure is no
    /// longer trustworthy. Every cached file is lost.
    pub fn make(&mut self) -> Result<()> {
        let mut index = build_fresh::<I>(&self.config)?;
        index.set_max_len(self.config.max_len);
        self.index = index;
        self.hits = 0;
        self.misses = 0;
        Ok(())
    }

    /// Detach from the index and remove the whole cache root
    ///
    /// Fails if the root is already gone.
    pub fn delete(self) -> Result<()> {
        let Self { config, index, .. } = self;
        drop(index);

        fs::remove_dir_all(&config.root).map_err(|e| CacheError::fs(&config.root, e))?;
        info!(root = %config.root.display(), "Deleted cover cache");
        Ok(())
    }

    /// Look up a key, treating every failure as "absent"
    pub fn get(&mut self, key: &str) -> Option<Cover> {
        match self.lookup(key) {
            Ok(cover) => Some(cover),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(key = key, error = %e, "Cover lookup failed");
                }
                None
            }
        }
    }

    /// Look up a key and count a hit, reporting why a lookup failed
    pub fn lookup(&mut self, key: &str) -> Result<Cover> {
        match self.index.get(key)? {
            Some(cover) => {
                self.hits += 1;
                debug!(key = key, "Cover cache HIT");
                Ok(cover)
            }
            None => {
                self.misses += 1;
                debug!(key = key, "Cover cache MISS");
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    /// Copy `source` into a random slot and record it under `key`
    ///
    /// The copy keeps the source's file name. A slot whose file of that name
    /// belongs to another key is skipped; if every slot has one, the copy fails.
    /// The index is only written once the copy exists and matches the source, so
    /// a failure never changes the entry for `key`.
    ///
    /// # Returns
    /// Path of the cached copy
    pub fn set(&mut self, key: &str, url: &str, source: impl AsRef<Path>) -> Result<PathBuf> {
        let source = source.as_ref();

        if key.is_empty() {
            return Err(CacheError::InvalidEntry("empty key".to_string()));
        }
        if url.is_empty() {
            return Err(CacheError::InvalidEntry(format!("empty url for {}", key)));
        }
        if !source.is_file() {
            return Err(CacheError::CopyFailed {
                path: source.to_path_buf(),
                reason: "source is not a regular file".to_string(),
            });
        }
        let file_name = source.file_name().ok_or_else(|| CacheError::CopyFailed {
            path: source.to_path_buf(),
            reason: "source has no file name".to_string(),
        })?;

        let (slot, target) = self.free_target(key, file_name).ok_or_else(|| {
            CacheError::CopyFailed {
                path: source.to_path_buf(),
                reason: format!(
                    "all {} slots hold a {:?} owned by another key",
                    self.slots.count(),
                    file_name
                ),
            }
        })?;
        fs::create_dir_all(&slot).map_err(|e| CacheError::fs(&slot, e))?;

        copy_verified(source, &slot, &target)?;

        if !target.is_file() {
            return Err(CacheError::CopyFailed {
                path: source.to_path_buf(),
                reason: format!("{} missing after copy", target.display()),
            });
        }

        self.index
            .set(key, Cover::new(url, Some(target.clone())))?;

        debug!(
            key = key,
            url = url,
            target = %target.display(),
            "Stored cover in cache"
        );

        Ok(target)
    }

    /// First slot (in random order) where `file_name` is not used by another key
    fn free_target(&self, key: &str, file_name: &OsStr) -> Option<(PathBuf, PathBuf)> {
        let taken: HashSet<PathBuf> = self
            .index
            .keys()
            .into_iter()
            .filter(|k| k != key)
            .filter_map(|k| self.index.peek(&k).and_then(|cover| cover.path))
            .collect();

        self.slots.candidates().into_iter().find_map(|slot| {
            let target = slot.join(file_name);
            if taken.contains(&target) {
                debug!(target = %target.display(), "Slot taken by another key");
                None
            } else {
                Some((slot, target))
            }
        })
    }

    /// Remove a key from the index
    ///
    /// The cached file stays on disk until the next `sync`.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.index.delete(key)? {
            debug!(key = key, "Removed cover from index");
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    /// Current index keys
    pub fn keys(&self) -> BTreeSet<String> {
        self.index.keys().into_iter().collect()
    }

    /// Hit counter kept by the index for `key`
    pub fn hits(&self, key: &str) -> Result<u64> {
        self.index
            .hits(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Change the purge bound for this instance
    pub fn set_max_len(&mut self, max_len: usize) {
        self.config.max_len = max_len;
        self.index.set_max_len(max_len);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn index(&self) -> &I {
        &self.index
    }
}

/// Remove the root if present and lay out an empty cache
fn build_fresh<I: PersistentIndex>(config: &CacheConfig) -> Result<I> {
    if config.root.is_dir() {
        fs::remove_dir_all(&config.root).map_err(|e| CacheError::fs(&config.root, e))?;
        warn!(root = %config.root.display(), "Removed existing cover cache");
    }
    fs::create_dir_all(&config.root).map_err(|e| CacheError::fs(&config.root, e))?;

    let index = I::create(&config.index_path())?;
    Slots::new(&config.root, config.nslots).create_all()?;

    info!(
        root = %config.root.display(),
        nslots = config.nslots,
        "Created empty cover cache"
    );
    Ok(index)
}

/// Copy through a temp file in `slot`, then check the target against the source
fn copy_verified(source: &Path, slot: &Path, target: &Path) -> Result<()> {
    let copy_failed = |reason: String| CacheError::CopyFailed {
        path: source.to_path_buf(),
        reason,
    };

    let mut input = File::open(source).map_err(|e| copy_failed(e.to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(slot).map_err(|e| copy_failed(e.to_string()))?;
    io::copy(&mut input, &mut tmp)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| copy_failed(e.to_string()))?;
    tmp.persist(target)
        .map_err(|e| copy_failed(e.error.to_string()))?;

    let expected = file_sha1(source).map_err(|e| copy_failed(e.to_string()))?;
    let actual = file_sha1(target).map_err(|e| copy_failed(e.to_string()))?;
    if expected != actual {
        if let Err(e) = fs::remove_file(target) {
            warn!(path = %target.display(), error = %e, "Failed to remove corrupt copy");
        }
        return Err(copy_failed(format!(
            "digest mismatch: expected {}, got {}",
            expected, actual
        )));
    }

    Ok(())
}

/// Hex SHA-1 of a file's contents
pub(crate) fn file_sha1(path: &Path) -> io::Result<String> {
    use sha1::{Digest, Sha1};

    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
