//! Bounded record cache.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lru::LruCache;

use megadoc_core::{CacheStats, FileRecord};

/// LRU cache of file records keyed by resolved path.
///
/// A record is only served while the file's size and modification time are
/// unchanged; a stale record is evicted on lookup.
pub struct RecordCache {
    entries: LruCache<PathBuf, FileRecord>,
    enabled: bool,
    capacity: usize,
}

impl RecordCache {
    /// Create a cache holding at most `capacity` records.
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            enabled,
            capacity,
        }
    }

    /// Cached record for `path` if it still matches `size` and `modified`.
    pub fn get_fresh(&mut self, path: &Path, size: u64, modified: SystemTime) -> Option<FileRecord> {
        if !self.enabled {
            return None;
        }

        let fresh = self.entries.get(path).map(|r| r.is_fresh(size, modified))?;
        if fresh {
            self.entries.peek(path).cloned()
        } else {
            tracing::debug!(path = %path.display(), "cached record is stale");
            self.entries.pop(path);
            None
        }
    }

    /// Store a record, evicting the least recently used one when full.
    pub fn insert(&mut self, record: FileRecord) {
        if self.enabled {
            self.entries.put(record.path.clone(), record);
        }
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot for reporting.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_files: self.entries.len(),
            cache_enabled: self.enabled,
            cache_size_limit: self.capacity,
        }
    }
}
