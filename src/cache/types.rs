//! Cache report types

use serde::Serialize;

/// Outcome of a `sync` pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Index entries examined
    pub checked: usize,
    /// Entries whose file was missing and whose path was cleared
    pub cleared: usize,
    /// Orphan files deleted from disk
    pub removed: usize,
}

impl SyncReport {
    /// True when the pass found nothing to repair
    pub fn is_clean(&self) -> bool {
        self.cleared == 0 && self.removed == 0
    }
}

/// Outcome of a `purge`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Index entries evicted
    pub evicted: usize,
    /// The sync that reclaimed their files
    pub sync: SyncReport,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Files under the root, index excluded
    pub files: usize,
    pub total_bytes: u64,
    /// Successful lookups through this instance
    pub hits: u64,
    /// Failed lookups through this instance
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate in percent, 0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert!(stats.hit_rate() > 49.0 && stats.hit_rate() < 51.0);
    }

    #[test]
    fn test_sync_report_serialization() {
        let report = PurgeReport {
            evicted: 2,
            sync: SyncReport {
                checked: 3,
                cleared: 0,
                removed: 2,
            },
        };
        assert!(!report.sync.is_clean());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"evicted\":2"));
        assert!(json.contains("\"removed\":2"));
    }
}
