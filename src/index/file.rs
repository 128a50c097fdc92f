//! JSON file index
//!
//! Keeps the whole index in memory and rewrites the file atomically after every
//! mutation. Sized for a few thousand covers, not for throughput.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Cover, PersistentIndex};
use crate::config::DEFAULT_MAX_LEN;
use crate::error::{CacheError, Result};

/// On-disk format version
const INDEX_VERSION: u32 = 1;

/// One key's bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    url: String,
    path: Option<PathBuf>,
    hits: u64,
    /// Write order, higher is newer
    seq: u64,
}

impl IndexRecord {
    fn cover(&self) -> Cover {
        Cover::new(self.url.clone(), self.path.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    version: u32,
    next_seq: u64,
    entries: BTreeMap<String, IndexRecord>,
}

impl IndexDocument {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            next_seq: 0,
            entries: BTreeMap::new(),
        }
    }
}

/// Index stored as a single JSON document
pub struct FileIndex {
    /// Location of the index file
    path: PathBuf,
    /// In-memory copy of the document
    doc: IndexDocument,
    /// Bound applied by `purge`
    max_len: usize,
}

impl FileIndex {
    /// Write the document to a temp file next to the index and rename it into place
    fn persist(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let bytes = serde_json::to_vec(&self.doc)
            .map_err(|e| CacheError::IndexUnavailable(format!("encode failed: {}", e)))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| CacheError::fs(parent, e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| CacheError::fs(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| CacheError::fs(&self.path, e.error))?;

        Ok(())
    }

    /// Put back a record after a failed persist
    fn restore(&mut self, key: &str, previous: Option<IndexRecord>) {
        match previous {
            Some(record) => {
                self.doc.entries.insert(key.to_string(), record);
            }
            None => {
                self.doc.entries.remove(key);
            }
        }
    }
}

impl PersistentIndex for FileIndex {
    fn create(path: &Path) -> Result<Self> {
        let index = Self {
            path: path.to_path_buf(),
            doc: IndexDocument::empty(),
            max_len: DEFAULT_MAX_LEN,
        };
        index.persist()?;
        debug!(path = %path.display(), "Created empty index");
        Ok(index)
    }

    fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| CacheError::fs(path, e))?;

        let mut doc: IndexDocument = serde_json::from_slice(&bytes).map_err(|e| {
            CacheError::IndexUnavailable(format!("{}: {}", path.display(), e))
        })?;

        if doc.version != INDEX_VERSION {
            return Err(CacheError::IndexUnavailable(format!(
                "{}: unsupported index version {} (expected {})",
                path.display(),
                doc.version,
                INDEX_VERSION
            )));
        }

        // A hand-edited or truncated counter must not hand out a seq twice
        let max_seq = doc.entries.values().map(|r| r.seq + 1).max().unwrap_or(0);
        doc.next_seq = doc.next_seq.max(max_seq);

        debug!(
            path = %path.display(),
            entries = doc.entries.len(),
            "Opened index"
        );

        Ok(Self {
            path: path.to_path_buf(),
            doc,
            max_len: DEFAULT_MAX_LEN,
        })
    }

    fn get(&mut self, key: &str) -> Result<Option<Cover>> {
        let Some(record) = self.doc.entries.get_mut(key) else {
            return Ok(None);
        };
        record.hits += 1;
        let hits = record.hits;
        let cover = record.cover();

        if let Err(e) = self.persist() {
            // The hit stays in memory and goes out with the next successful write
            warn!(key = key, hits = hits, error = %e, "Failed to persist hit counter");
        }

        Ok(Some(cover))
    }

    fn peek(&self, key: &str) -> Option<Cover> {
        self.doc.entries.get(key).map(IndexRecord::cover)
    }

    fn set(&mut self, key: &str, cover: Cover) -> Result<()> {
        let seq = self.doc.next_seq;
        self.doc.next_seq += 1;

        let record = IndexRecord {
            url: cover.url,
            path: cover.path,
            hits: 0,
            seq,
        };
        let previous = self.doc.entries.insert(key.to_string(), record);

        if let Err(e) = self.persist() {
            self.restore(key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn replace(&mut self, key: &str, cover: Cover) -> Result<bool> {
        let Some(record) = self.doc.entries.get_mut(key) else {
            return Ok(false);
        };
        let previous = record.clone();
        record.url = cover.url;
        record.path = cover.path;

        if let Err(e) = self.persist() {
            self.restore(key, Some(previous));
            return Err(e);
        }
        Ok(true)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let Some(previous) = self.doc.entries.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist() {
            self.restore(key, Some(previous));
            return Err(e);
        }
        Ok(true)
    }

    fn keys(&self) -> Vec<String> {
        self.doc.entries.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.doc.entries.len()
    }

    fn hits(&self, key: &str) -> Option<u64> {
        self.doc.entries.get(key).map(|r| r.hits)
    }

    fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    fn purge(&mut self) -> Result<Vec<String>> {
        if self.doc.entries.len() <= self.max_len {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(&String, &IndexRecord)> = self.doc.entries.iter().collect();
        ranked.sort_by_key(|(_, r)| Reverse((r.hits, r.seq)));
        let evicted: Vec<String> = ranked[self.max_len..]
            .iter()
            .map(|(k, _)| (*k).clone())
            .collect();

        let mut removed = Vec::with_capacity(evicted.len());
        for key in &evicted {
            if let Some(record) = self.doc.entries.remove(key) {
                removed.push((key.clone(), record));
            }
        }

        if let Err(e) = self.persist() {
            self.doc.entries.extend(removed);
            return Err(e);
        }

        info!(
            evicted = evicted.len(),
            kept = self.doc.entries.len(),
            max_len = self.max_len,
            "Purged index"
        );

        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cover(n: u32) -> Cover {
        Cover::new(
            format!("http://x/{}.jpg", n),
            Some(PathBuf::from(format!("/tmp/c/slot00/{}.jpg", n))),
        )
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".index");

        let mut index = FileIndex::create(&path).unwrap();
        assert!(index.is_empty());
        index.set("b1.001", cover(1)).unwrap();

        let reopened = FileIndex::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.peek("b1.001"), Some(cover(1)));
    }

    #[test]
    fn test_get_counts_hits_and_persists_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".index");

        let mut index = FileIndex::create(&path).unwrap();
        index.set("k", cover(1)).unwrap();
        assert_eq!(index.hits("k"), Some(0));

        assert_eq!(index.get("k").unwrap(), Some(cover(1)));
        assert_eq!(index.get("k").unwrap(), Some(cover(1)));
        assert!(index.peek("k").is_some());
        assert_eq!(index.hits("k"), Some(2));

        let reopened = FileIndex::open(&path).unwrap();
        assert_eq!(reopened.hits("k"), Some(2));
    }

    #[test]
    fn test_get_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = FileIndex::create(&dir.path().join(".index")).unwrap();
        assert_eq!(index.get("nope").unwrap(), None);
        assert_eq!(index.hits("nope"), None);
    }

    #[test]
    fn test_set_resets_hits_but_replace_keeps_them() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = FileIndex::create(&dir.path().join(".index")).unwrap();

        index.set("k", cover(1)).unwrap();
        index.get("k").unwrap();
        assert!(index.replace("k", Cover::new("http://x/1.jpg", None)).unwrap());
        assert_eq!(index.hits("k"), Some(1));
        assert_eq!(index.peek("k").unwrap().path, None);

        index.set("k", cover(2)).unwrap();
        assert_eq!(index.hits("k"), Some(0));

        assert!(!index.replace("absent", cover(3)).unwrap());
        assert!(index.peek("absent").is_none());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = FileIndex::create(&dir.path().join(".index")).unwrap();

        index.set("k", cover(1)).unwrap();
        assert!(index.delete("k").unwrap());
        assert!(!index.delete("k").unwrap());
        assert!(index.keys().is_empty());
    }

    #[test]
    fn test_purge_prefers_hits_then_newest() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = FileIndex::create(&dir.path().join(".index")).unwrap();

        for n in 0..6 {
            index.set(&format!("k{}", n), cover(n)).unwrap();
        }
        // k0 is the oldest but the most read
        index.get("k0").unwrap();
        index.get("k0").unwrap();
        index.get("k1").unwrap();

        index.set_max_len(3);
        let mut evicted = index.purge().unwrap();
        evicted.sort();

        assert_eq!(evicted, vec!["k2", "k3", "k4"]);
        assert_eq!(index.keys(), vec!["k0", "k1", "k5"]);
    }

    #[test]
    fn test_purge_within_bound_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = FileIndex::create(&dir.path().join(".index")).unwrap();
        index.set("k", cover(1)).unwrap();

        assert!(index.purge().unwrap().is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_open_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".index");
        fs::write(&path, b"\x00\x01 not json").unwrap();

        let err = FileIndex::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::IndexUnavailable(_)));
    }

    #[test]
    fn test_open_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".index");
        fs::write(&path, r#"{"version": 99, "next_seq": 0, "entries": {}}"#).unwrap();

        let err = FileIndex::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::IndexUnavailable(_)));
    }

    #[test]
    fn test_open_repairs_stale_seq_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".index");
        fs::write(
            &path,
            r#"{"version": 1, "next_seq": 0, "entries": {
                "old": {"url": "http://x/1.jpg", "path": null, "hits": 0, "seq": 7}
            }}"#,
        )
        .unwrap();

        let mut index = FileIndex::open(&path).unwrap();
        index.set("new", cover(2)).unwrap();
        index.set_max_len(1);
        assert_eq!(index.purge().unwrap(), vec!["old"]);
    }
}
