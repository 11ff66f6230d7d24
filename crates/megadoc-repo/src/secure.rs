//! Filesystem-backed repository with path security checks.

use std::fs::{self, File, Metadata};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use megadoc_core::{
    CacheStats, FileRecord, MegaDocConfig, MegaDocError, Result, StreamDecoder,
    decode_with_fallback,
};

use crate::FileRepository;
use crate::cache::RecordCache;
use crate::stream::{ChunkStream, FileChunks};

/// Repository reading real files under a canonicalized base directory.
pub struct SecureFileRepository {
    base: PathBuf,
    config: Arc<MegaDocConfig>,
    cache: RecordCache,
}

impl SecureFileRepository {
    /// Create a repository rooted at `base`.
    ///
    /// The base directory is canonicalized when it exists so symlinked paths
    /// compare correctly.
    pub fn new(base: impl AsRef<Path>, config: Arc<MegaDocConfig>) -> Self {
        let base = base.as_ref();
        let absolute = if base.is_absolute() {
            base.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(base))
                .unwrap_or_else(|_| base.to_path_buf())
        };
        let base = absolute
            .canonicalize()
            .unwrap_or_else(|_| normalize_lexically(&absolute));

        let cache = RecordCache::new(config.enable_caching, config.cache_size);
        tracing::debug!(base = %base.display(), "opened file repository");
        Self {
            base,
            config,
            cache,
        }
    }

    /// Create a repository rooted at the current directory.
    pub fn current_dir(config: Arc<MegaDocConfig>) -> Self {
        Self::new(".", config)
    }

    /// The configuration in use.
    pub fn config(&self) -> &Arc<MegaDocConfig> {
        &self.config
    }

    fn regular_file(&self, path: &Path) -> Result<(PathBuf, Metadata)> {
        let resolved = self.validate_path(path)?;
        let metadata =
            fs::metadata(&resolved).map_err(|e| MegaDocError::io(path.display().to_string(), &e))?;
        if !metadata.is_file() {
            return Err(MegaDocError::validation(
                path.display().to_string(),
                "Not a regular file",
            ));
        }
        Ok((resolved, metadata))
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn record_from_metadata(path: PathBuf, metadata: &Metadata) -> FileRecord {
    #[cfg(unix)]
    let permissions = {
        use std::os::unix::fs::PermissionsExt;
        Some(format!("{:o}", metadata.permissions().mode() & 0o777))
    };

    #[cfg(not(unix))]
    let permissions = None;

    let is_readable = File::open(&path).is_ok();
    FileRecord {
        extension: FileRecord::extension_of(&path),
        size: metadata.len(),
        modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        created: metadata.created().ok(),
        is_readable,
        permissions,
        path,
    }
}

impl FileRepository for SecureFileRepository {
    fn validate_path(&self, path: &Path) -> Result<PathBuf> {
        let raw = path.to_string_lossy();
        if raw.trim().is_empty() {
            return Err(MegaDocError::validation(raw, "Empty path"));
        }
        if raw.contains('\0') {
            return Err(MegaDocError::validation(raw, "Path contains a NUL byte"));
        }

        let unified = PathBuf::from(raw.replace('\\', "/"));
        let joined = if unified.is_absolute() {
            unified
        } else {
            self.base.join(unified)
        };
        let resolved = joined
            .canonicalize()
            .unwrap_or_else(|_| normalize_lexically(&joined));

        let depth = match resolved.strip_prefix(&self.base) {
            Ok(relative) => relative.components().count().saturating_sub(1),
            Err(_) => {
                if !self.config.allow_path_traversal {
                    tracing::warn!(path = %raw, "path escapes the base directory");
                    return Err(MegaDocError::traversal(&raw));
                }
                resolved.components().count().saturating_sub(1)
            }
        };

        if depth > self.config.max_depth_levels {
            return Err(MegaDocError::too_deep(&raw, depth, self.config.max_depth_levels));
        }
        Ok(resolved)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.validate_path(path)
            .map(|resolved| resolved.is_file())
            .unwrap_or(false)
    }

    fn get_file_info(&mut self, path: &Path) -> Result<FileRecord> {
        let (resolved, metadata) = self.regular_file(path)?;
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);

        if let Some(record) = self.cache.get_fresh(&resolved, metadata.len(), modified) {
            return Ok(record);
        }

        let record = record_from_metadata(resolved, &metadata);
        self.cache.insert(record.clone());
        Ok(record)
    }

    fn read_file(&mut self, path: &Path) -> Result<String> {
        let label = path.display().to_string();
        let record = self.get_file_info(path)?;

        if self.config.is_file_too_large(record.size) {
            return Err(MegaDocError::validation(
                label,
                format!(
                    "File too large: {} bytes (max {} bytes)",
                    record.size,
                    self.config.get_max_file_size_bytes()
                ),
            ));
        }
        if !record.is_readable {
            return Err(MegaDocError::validation(label, "File not readable"));
        }

        let file = File::open(&record.path).map_err(|e| MegaDocError::io(label.clone(), &e))?;
        let limit = u64::try_from(self.config.get_max_file_size_bytes()).unwrap_or(0);
        let bytes = read_limited(file, limit, &label)?;
        let decoded = decode_with_fallback(
            &bytes,
            self.config.default_encoding,
            self.config.get_encoding_options(),
        );

        if decoded.lossy {
            tracing::warn!(file = %label, encoding = %decoded.encoding, "decoded with replacement characters");
        } else if decoded.encoding != self.config.default_encoding {
            tracing::debug!(file = %label, encoding = %decoded.encoding, "decoded with fallback encoding");
        }
        Ok(decoded.text)
    }

    fn read_file_stream(&mut self, path: &Path) -> Result<ChunkStream> {
        let label = path.display().to_string();
        let (resolved, _) = self.regular_file(path)?;
        let file = File::open(&resolved).map_err(|e| MegaDocError::io(label.clone(), &e))?;

        let decoder = StreamDecoder::new(
            self.config.default_encoding,
            self.config.permissive_encoding(),
        );
        Ok(Box::new(FileChunks::new(
            file,
            self.config.chunk_size,
            decoder,
            label,
        )))
    }

    fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn base_path(&self) -> &Path {
        &self.base
    }

    fn repository_type(&self) -> &'static str {
        "SecureFileRepository"
    }
}

/// Read at most `limit` bytes. A file that grew past the limit after it was
/// checked is rejected rather than truncated.
fn read_limited(reader: impl Read, limit: u64, label: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| MegaDocError::io(label, &e))?;
    if bytes.len() as u64 > limit {
        return Err(MegaDocError::validation(
            label,
            format!("File too large: grew past {limit} bytes while reading"),
        ));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_limited_rejects_growth() {
        assert_eq!(read_limited(Cursor::new(b"abcd".to_vec()), 4, "f.txt").unwrap(), b"abcd");

        let err = read_limited(Cursor::new(b"abcde".to_vec()), 4, "f.txt").unwrap_err();
        assert_eq!(err.error_code(), "FILE_VALIDATION");
        assert!(err.to_string().contains("File too large"));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/base/./a/../b/c.py")),
            PathBuf::from("/base/b/c.py")
        );
        assert_eq!(
            normalize_lexically(Path::new("/base/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
    }

    #[test]
    fn test_validate_path_lexical() {
        let repo = SecureFileRepository::new("/nonexistent-base", Arc::new(MegaDocConfig::default()));

        assert_eq!(
            repo.validate_path(Path::new("src/main.py")).unwrap(),
            PathBuf::from("/nonexistent-base/src/main.py")
        );
        assert!(repo.validate_path(Path::new("../outside.py")).is_err());
        assert!(repo.validate_path(Path::new("")).is_err());
    }
}
