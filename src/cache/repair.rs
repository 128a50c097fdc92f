//! Index/filesystem reconciliation
//!
//! `sync` repairs both directions: entries whose file disappeared lose their
//! path (the url is kept), and files no entry refers to are deleted. `purge`
//! bounds the index and then syncs to reclaim the evicted files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::covers::CoverStore;
use super::types::{CacheStats, PurgeReport, SyncReport};
use crate::error::{CacheError, Result};
use crate::index::{Cover, PersistentIndex};

impl<I: PersistentIndex> CoverStore<I> {
    /// Every non-directory entry under the cache root, index included
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.root;
        let mut files = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                CacheError::fs(path, e.into())
            })?;
            if !entry.file_type().is_dir() {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Reconcile the index with the files on disk
    pub fn sync(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        self.slots.create_all()?;

        let mut checked: HashSet<PathBuf> = HashSet::new();
        checked.insert(self.config.index_path());

        for key in self.index.keys() {
            let Some(cover) = self.index.peek(&key) else {
                continue;
            };
            report.checked += 1;

            match cover.path {
                Some(path) if path.is_file() => {
                    checked.insert(path);
                }
                Some(path) => {
                    warn!(
                        key = %key,
                        path = %path.display(),
                        "Cached cover missing, clearing path"
                    );
                    self.index.replace(&key, Cover::new(cover.url, None))?;
                    report.cleared += 1;
                }
                None => {}
            }
        }

        for file in self.files()? {
            if checked.contains(&file) {
                continue;
            }
            match fs::remove_file(&file) {
                Ok(()) => {
                    debug!(path = %file.display(), "Removed orphan file");
                    report.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::fs(&file, e)),
            }
        }

        if report.is_clean() {
            debug!(checked = report.checked, "Cover cache in sync");
        } else {
            info!(
                checked = report.checked,
                cleared = report.cleared,
                removed = report.removed,
                "Repaired cover cache"
            );
        }

        Ok(report)
    }

    /// Evict low-value entries down to `max_len`, then reclaim their files
    ///
    /// A failure leaves the cache consistent, just not smaller.
    pub fn purge(&mut self) -> Result<PurgeReport> {
        let evicted = self.index.purge()?;
        for key in &evicted {
            debug!(key = %key, "Evicted cover");
        }
        let sync = self.sync()?;

        Ok(PurgeReport {
            evicted: evicted.len(),
            sync,
        })
    }

    /// Entry, file and lookup counts for this cache
    pub fn stats(&self) -> Result<CacheStats> {
        let index_path = self.config.index_path();
        let mut stats = CacheStats {
            entries: self.index.len(),
            hits: self.hits,
            misses: self.misses,
            ..Default::default()
        };

        for file in self.files()? {
            if file == index_path {
                continue;
            }
            stats.files += 1;
            if let Ok(meta) = fs::metadata(&file) {
                stats.total_bytes += meta.len();
            }
        }

        Ok(stats)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        match self.stats() {
            Ok(stats) => debug!(
                entries = stats.entries,
                files = stats.files,
                total_bytes = stats.total_bytes,
                hits = stats.hits,
                misses = stats.misses,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Cover cache metrics"
            ),
            Err(e) => warn!(error = %e, "Failed to collect cover cache metrics"),
        }
    }
}
