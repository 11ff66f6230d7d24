//! In-memory repository for tests.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use megadoc_core::{
    CacheStats, FileRecord, MegaDocConfig, MegaDocError, Result, StreamDecoder,
    decode_with_fallback,
};
use megadoc_extract::PathPolicy;

use crate::FileRepository;
use crate::cache::RecordCache;
use crate::stream::{ChunkStream, FileChunks};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    size: u64,
    modified: SystemTime,
    readable: bool,
}

/// Repository serving files from memory.
///
/// Applies the same traversal, depth and size policy as
/// [`SecureFileRepository`](crate::SecureFileRepository), lexically.
pub struct MockFileRepository {
    base: PathBuf,
    config: Arc<MegaDocConfig>,
    files: BTreeMap<String, MockFile>,
    cache: RecordCache,
}

impl MockFileRepository {
    /// Create an empty repository with a virtual base directory.
    pub fn new(config: Arc<MegaDocConfig>) -> Self {
        Self::with_base("/mock", config)
    }

    /// Create an empty repository rooted at `base`.
    pub fn with_base(base: impl Into<PathBuf>, config: Arc<MegaDocConfig>) -> Self {
        let cache = RecordCache::new(config.enable_caching, config.cache_size);
        Self {
            base: base.into(),
            config,
            files: BTreeMap::new(),
            cache,
        }
    }

    /// Add or replace a file.
    ///
    /// `size` defaults to the content length and `modified` to now. An
    /// explicit size lets tests simulate large files cheaply.
    pub fn add_file(
        &mut self,
        path: &str,
        content: impl Into<Vec<u8>>,
        size: Option<u64>,
        modified: Option<SystemTime>,
    ) {
        let content = content.into();
        let file = MockFile {
            size: size.unwrap_or(content.len() as u64),
            modified: modified.unwrap_or_else(SystemTime::now),
            readable: true,
            content,
        };
        let key = self.key(path);
        self.files.insert(key, file);
    }

    /// Mark a file as unreadable or readable again.
    pub fn set_readable(&mut self, path: &str, readable: bool) {
        let key = self.key(path);
        if let Some(file) = self.files.get_mut(&key) {
            file.readable = readable;
        }
    }

    /// Remove a file. Returns whether it existed.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let key = self.key(path);
        self.files.remove(&key).is_some()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is stored.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Portion of `unified` below the base directory, if any.
    fn relative_to_base<'p>(&self, unified: &'p str) -> Option<&'p str> {
        let base = self.base.to_string_lossy().replace('\\', "/");
        unified
            .strip_prefix(base.trim_end_matches('/'))
            .filter(|rest| rest.starts_with('/'))
    }

    /// Storage key: forward slashes, no `.` or empty segments, relative to the
    /// base when inside it. Absolute paths outside the base keep their root.
    fn key(&self, path: &str) -> String {
        let unified = path.replace('\\', "/");
        let (root, relative) = match self.relative_to_base(&unified) {
            Some(rest) => ("", rest),
            None if unified.starts_with('/') => ("/", unified.as_str()),
            None => ("", unified.as_str()),
        };

        let joined = relative
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");
        format!("{root}{joined}")
    }

    fn lookup(&self, path: &Path) -> Result<(PathBuf, &MockFile)> {
        let resolved = self.validate_path(path)?;
        let label = path.display().to_string();
        self.files
            .get(&self.key(&label))
            .map(|file| (resolved, file))
            .ok_or_else(|| MegaDocError::validation(label, "File does not exist"))
    }
}

impl FileRepository for MockFileRepository {
    fn validate_path(&self, path: &Path) -> Result<PathBuf> {
        let raw = path.to_string_lossy();
        if raw.trim().is_empty() {
            return Err(MegaDocError::validation(raw, "Empty path"));
        }
        if raw.contains('\0') {
            return Err(MegaDocError::validation(raw, "Path contains a NUL byte"));
        }

        let unified = raw.replace('\\', "/");
        let is_inside = !unified.starts_with('/') || self.relative_to_base(&unified).is_some();
        if !is_inside && !self.config.allow_path_traversal {
            return Err(MegaDocError::traversal(&raw));
        }

        let key = self.key(&unified);
        PathPolicy::from_config(&self.config).check(&key)?;
        Ok(self.base.join(key))
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.lookup(path).is_ok()
    }

    fn get_file_info(&mut self, path: &Path) -> Result<FileRecord> {
        let (resolved, file) = self.lookup(path)?;
        let (size, modified, readable) = (file.size, file.modified, file.readable);

        if let Some(record) = self.cache.get_fresh(&resolved, size, modified) {
            return Ok(record);
        }

        let record = FileRecord {
            extension: FileRecord::extension_of(&resolved),
            path: resolved,
            size,
            modified,
            created: Some(modified),
            is_readable: readable,
            permissions: Some(if readable { "644" } else { "000" }.to_string()),
        };
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

        let (_, file) = self.lookup(path)?;
        let decoded = decode_with_fallback(
            &file.content,
            self.config.default_encoding,
            self.config.get_encoding_options(),
        );
        Ok(decoded.text)
    }

    fn read_file_stream(&mut self, path: &Path) -> Result<ChunkStream> {
        let label = path.display().to_string();
        let (_, file) = self.lookup(path)?;
        if !file.readable {
            return Err(MegaDocError::validation(label, "File not readable"));
        }

        let decoder = StreamDecoder::new(
            self.config.default_encoding,
            self.config.permissive_encoding(),
        );
        Ok(Box::new(FileChunks::new(
            Cursor::new(file.content.clone()),
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
        "MockFileRepository"
    }
}
