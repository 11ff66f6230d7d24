//! Records shared between the repository and the builder.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Metadata about a file, as cached by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Resolved path.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Creation time, when the platform reports it.
    pub created: Option<SystemTime>,
    /// Lowercase extension without the dot (empty when none).
    pub extension: String,
    /// Whether the file could be opened for reading.
    pub is_readable: bool,
    /// Unix permission bits in octal, when available.
    pub permissions: Option<String>,
}

impl FileRecord {
    /// Lowercase extension of `path`, without the dot.
    pub fn extension_of(path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    /// Whether the record still describes a file with this size and mtime.
    pub fn is_fresh(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }

    /// Modification time in local time.
    pub fn modified_local(&self) -> DateTime<Local> {
        DateTime::<Local>::from(self.modified)
    }
}

/// Snapshot of a repository's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently cached.
    pub cached_files: usize,
    /// Whether caching is enabled.
    pub cache_enabled: bool,
    /// Maximum number of entries.
    pub cache_size_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_extension_of() {
        assert_eq!(FileRecord::extension_of(Path::new("src/Main.PY")), "py");
        assert_eq!(FileRecord::extension_of(Path::new("Makefile")), "");
        assert_eq!(FileRecord::extension_of(Path::new(".bashrc")), "");
    }

    #[test]
    fn test_is_fresh() {
        let now = SystemTime::now();
        let record = FileRecord {
            path: PathBuf::from("/repo/a.py"),
            size: 10,
            modified: now,
            created: None,
            extension: "py".into(),
            is_readable: true,
            permissions: None,
        };
        assert!(record.is_fresh(10, now));
        assert!(!record.is_fresh(11, now));
        assert!(!record.is_fresh(10, now + Duration::from_secs(1)));
    }
}
