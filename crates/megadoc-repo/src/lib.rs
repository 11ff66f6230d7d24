//! File access for megadoc.
//!
//! Every read goes through a [`FileRepository`], which applies the traversal
//! and depth policy, the size limit and the encoding fallback chain before any
//! content reaches the document builder.

mod cache;
mod collect;
mod mock;
mod secure;
mod stream;

use std::path::{Path, PathBuf};

use megadoc_core::{CacheStats, FileRecord, Result};

pub use cache::RecordCache;
pub use collect::{SKIPPED_DIRECTORIES, collect_directory_files};
pub use mock::MockFileRepository;
pub use secure::SecureFileRepository;
pub use stream::{ChunkStream, FileChunks};

/// Policy-checked access to files under a base directory.
pub trait FileRepository: Send {
    /// Resolve `path` against the base directory and apply the path policy.
    fn validate_path(&self, path: &Path) -> Result<PathBuf>;

    /// Whether `path` names a readable location that passes the policy.
    /// Never fails.
    fn file_exists(&self, path: &Path) -> bool;

    /// Metadata for `path`, served from the cache when still fresh.
    fn get_file_info(&mut self, path: &Path) -> Result<FileRecord>;

    /// Read and decode the whole file.
    fn read_file(&mut self, path: &Path) -> Result<String>;

    /// Read the file lazily in decoded chunks. No size limit applies.
    fn read_file_stream(&mut self, path: &Path) -> Result<ChunkStream>;

    /// Drop every cached record.
    fn clear_cache(&mut self);

    /// Snapshot of the cache.
    fn get_cache_stats(&self) -> CacheStats;

    /// The base directory relative paths are resolved against.
    fn base_path(&self) -> &Path;

    /// Name of the implementation.
    fn repository_type(&self) -> &'static str;
}
