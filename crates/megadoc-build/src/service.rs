//! Service facade wiring repository, extractor and builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;

use megadoc_core::{CacheStats, MegaDocConfig, MegaDocError, Result};
use megadoc_repo::{FileRepository, SecureFileRepository, collect_directory_files};

use crate::builder::{BuildOptions, DocumentBuilder};
use crate::stats::BuildStats;

/// Snapshot of the service configuration and repository state.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub config: Value,
    pub cache_stats: CacheStats,
    pub repository_type: String,
    pub base_path: PathBuf,
}

/// High-level entry point for building mega documents.
pub struct MegaDocumentService {
    config: Arc<MegaDocConfig>,
    builder: DocumentBuilder,
}

impl MegaDocumentService {
    /// Service reading files relative to the current directory.
    pub fn new(config: Arc<MegaDocConfig>) -> Self {
        let repository = SecureFileRepository::current_dir(config.clone());
        Self::with_repository(Box::new(repository), config)
    }

    /// Service reading files relative to `base`.
    pub fn with_base_path(base: impl AsRef<Path>, config: Arc<MegaDocConfig>) -> Self {
        let repository = SecureFileRepository::new(base, config.clone());
        Self::with_repository(Box::new(repository), config)
    }

    /// Service over a caller-supplied repository.
    pub fn with_repository(repository: Box<dyn FileRepository>, config: Arc<MegaDocConfig>) -> Self {
        let builder = DocumentBuilder::new(repository, config.clone());
        Self { config, builder }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Arc<MegaDocConfig> {
        &self.config
    }

    /// The underlying builder.
    pub fn builder(&mut self) -> &mut DocumentBuilder {
        &mut self.builder
    }

    /// Paths referenced by a review, without building anything.
    pub fn extract_from_review(&mut self, review_path: &Path) -> Result<Vec<String>> {
        self.builder.extract_from_review(review_path)
    }

    /// Build a document from the files referenced by a review.
    ///
    /// The output directory tree is created first.
    pub fn create_mega_document(
        &mut self,
        review_path: &Path,
        output_path: &Path,
        options: &BuildOptions,
    ) -> Result<BuildStats> {
        ensure_output_dir(output_path)?;
        self.builder.build(review_path, output_path, options)
    }

    /// Build a document from an explicit list of files.
    pub fn create_from_files(
        &mut self,
        files: &[String],
        output_path: &Path,
        options: &BuildOptions,
    ) -> Result<BuildStats> {
        ensure_output_dir(output_path)?;
        self.builder
            .build_from_paths(files, "file list", output_path, options)
    }

    /// Build a document from every eligible file below `dirs`.
    pub fn create_from_directories(
        &mut self,
        dirs: &[PathBuf],
        output_path: &Path,
        options: &BuildOptions,
    ) -> Result<BuildStats> {
        let label = dirs.iter().map(|d| d.display()).join(", ");
        let files = collect_directory_files(self.builder.repository().base_path(), dirs, &self.config)?;
        if files.is_empty() {
            return Err(MegaDocError::extraction(label, "No eligible files found"));
        }

        ensure_output_dir(output_path)?;
        self.builder
            .build_from_paths(&files, &label, output_path, options)
    }

    /// Configuration, cache statistics and repository details.
    pub fn get_system_info(&self) -> SystemInfo {
        let repository = self.builder.repository();
        SystemInfo {
            config: self.config.to_value(),
            cache_stats: repository.get_cache_stats(),
            repository_type: repository.repository_type().to_string(),
            base_path: repository.base_path().to_path_buf(),
        }
    }
}

fn ensure_output_dir(output_path: &Path) -> Result<()> {
    let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|e| {
        MegaDocError::build(
            output_path,
            format!("Cannot create output directory {}: {e}", parent.display()),
        )
    })
}
