//! Document assembly.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use itertools::Itertools;
use tempfile::NamedTempFile;

use megadoc_core::{MegaDocConfig, MegaDocError, Result};
use megadoc_extract::FileExtractor;
use megadoc_repo::FileRepository;

use crate::render::{DocumentHeader, RenderedFile, render_document};
use crate::stats::{BuildStats, FileFailure};

/// Header text and output layout of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub title: String,
    pub description: Option<String>,
    /// Split the output into parts of roughly this many bytes of file
    /// content. `None` writes a single document.
    pub max_part_bytes: Option<u64>,
    /// Bug report included before the table of contents of the first part.
    pub bug_report: Option<PathBuf>,
}

impl BuildOptions {
    /// Options with a title, no description and a single output document.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            max_part_bytes: None,
            bug_report: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Split the output by content size.
    pub fn with_max_part_bytes(mut self, bytes: u64) -> Self {
        self.max_part_bytes = Some(bytes.max(1));
        self
    }

    /// Include a bug report, read through the repository.
    pub fn with_bug_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.bug_report = Some(path.into());
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::new("Mega Document")
    }
}

/// Assembles mega documents from files read through a repository.
pub struct DocumentBuilder {
    repository: Box<dyn FileRepository>,
    extractor: FileExtractor,
}

impl DocumentBuilder {
    /// Create a builder over `repository`, extracting with `config`.
    pub fn new(repository: Box<dyn FileRepository>, config: Arc<MegaDocConfig>) -> Self {
        Self {
            repository,
            extractor: FileExtractor::new(config),
        }
    }

    /// The repository files are read through.
    pub fn repository(&self) -> &dyn FileRepository {
        self.repository.as_ref()
    }

    /// Mutable access to the repository.
    pub fn repository_mut(&mut self) -> &mut dyn FileRepository {
        self.repository.as_mut()
    }

    /// The path extractor.
    pub fn extractor(&self) -> &FileExtractor {
        &self.extractor
    }

    /// Read a review and return the paths it references.
    pub fn extract_from_review(&mut self, review_path: &Path) -> Result<Vec<String>> {
        let review = self.repository.read_file(review_path)?;
        Ok(self.extractor.extract_file_paths(&review))
    }

    /// Build a document from the files referenced by a review.
    ///
    /// Fails when the review cannot be read, references no usable path, or
    /// the output cannot be written. Unreadable referenced files are recorded
    /// in the returned stats and skipped.
    pub fn build(
        &mut self,
        review_path: &Path,
        output_path: &Path,
        options: &BuildOptions,
    ) -> Result<BuildStats> {
        let start = Instant::now();
        let source = review_path.display().to_string();

        let paths = self.extract_from_review(review_path)?;
        if paths.is_empty() {
            return Err(MegaDocError::extraction(source, "No valid file paths found"));
        }
        tracing::info!(review = %source, files = paths.len(), "building mega document");

        self.assemble(&source, paths, output_path, options, start)
    }

    /// Build a document from an explicit list of paths.
    pub fn build_from_paths(
        &mut self,
        paths: &[String],
        source_label: &str,
        output_path: &Path,
        options: &BuildOptions,
    ) -> Result<BuildStats> {
        let start = Instant::now();
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.replace('\\', "/"))
            .sorted()
            .dedup()
            .collect();
        if paths.is_empty() {
            return Err(MegaDocError::extraction(source_label, "No files given"));
        }
        tracing::info!(source = %source_label, files = paths.len(), "building mega document");

        self.assemble(source_label, paths, output_path, options, start)
    }

    fn assemble(
        &mut self,
        source: &str,
        paths: Vec<String>,
        output_path: &Path,
        options: &BuildOptions,
        start: Instant,
    ) -> Result<BuildStats> {
        let bug_report = match &options.bug_report {
            Some(path) => Some(self.repository.read_file(path)?),
            None => None,
        };

        let mut files = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();

        for (idx, path) in paths.iter().enumerate() {
            match self.load(path) {
                Ok((content, record)) => {
                    tracing::debug!(file = %path, bytes = record.size, "included file");
                    files.push(RenderedFile {
                        number: idx + 1,
                        path: path.clone(),
                        content,
                        record,
                    });
                }
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(file = %path, error = %err, "skipping file");
                    failures.push(FileFailure {
                        path: path.clone(),
                        error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let generated = Local::now();
        let parts = split_parts(&paths, &files, options.max_part_bytes);
        let part_count = parts.len();
        let mut output_files = Vec::with_capacity(part_count);
        let mut output_bytes = 0;

        for (idx, range) in parts.into_iter().enumerate() {
            let (target, part) = if part_count == 1 {
                (output_path.to_path_buf(), None)
            } else {
                (part_path(output_path, idx + 1), Some((idx + 1, part_count)))
            };
            let header = DocumentHeader {
                title: &options.title,
                source,
                description: options.description.as_deref(),
                generated,
                total_files: paths.len(),
                part,
                bug_report: bug_report.as_deref().filter(|_| idx == 0),
            };
            let part_files: Vec<RenderedFile> = files
                .iter()
                .filter(|f| range.contains(&(f.number - 1)))
                .cloned()
                .collect();
            let document = render_document(&header, &paths[range.clone()], range.start + 1, &part_files);
            write_output(&target, &document)?;
            tracing::debug!(output = %target.display(), bytes = document.len(), "document part written");

            output_bytes += document.len() as u64;
            output_files.push(target);
        }

        let stats = BuildStats {
            review_file: source.to_string(),
            output_file: output_path.to_path_buf(),
            output_files,
            total_files_found: paths.len(),
            processed_files: files.len(),
            included_files: files.into_iter().map(|f| f.path).collect(),
            failed_files: failures,
            processing_time_seconds: start.elapsed().as_secs_f64(),
            output_bytes,
        };
        tracing::info!(
            output = %output_path.display(),
            processed = stats.processed_files,
            failed = stats.failed_files.len(),
            parts = stats.output_files.len(),
            "mega document written"
        );
        Ok(stats)
    }

    fn load(&mut self, path: &str) -> Result<(String, megadoc_core::FileRecord)> {
        let path = Path::new(path);
        let record = self.repository.get_file_info(path)?;
        let content = self.repository.read_file(path)?;
        Ok((content, record))
    }
}

/// Split the extracted paths into contiguous index ranges, one per part.
///
/// The part count is estimated from the total size of the files that were
/// read, and the paths are spread evenly across the parts. Parts that would
/// be empty are dropped, so the result always has at least one range.
fn split_parts(
    paths: &[String],
    files: &[RenderedFile],
    max_part_bytes: Option<u64>,
) -> Vec<std::ops::Range<usize>> {
    let Some(limit) = max_part_bytes.filter(|limit| *limit > 0) else {
        return vec![0..paths.len()];
    };
    let total_bytes: u64 = files.iter().map(|f| f.record.size).sum();
    let estimated = usize::try_from(total_bytes / limit)
        .unwrap_or(usize::MAX)
        .saturating_add(1);
    if estimated <= 1 || paths.len() <= 1 {
        return vec![0..paths.len()];
    }

    let per_part = paths.len() / estimated + 1;
    (0..paths.len())
        .step_by(per_part)
        .map(|start| start..(start + per_part).min(paths.len()))
        .collect()
}

/// `<stem>_part<n><ext>` next to `output`.
fn part_path(output: &Path, number: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mega_document".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}_part{number}.{}", ext.to_string_lossy()),
        None => format!("{stem}_part{number}"),
    };
    output.with_file_name(name)
}

/// Write `document` to a temporary file next to `output` and move it into place.
fn write_output(output: &Path, document: &str) -> Result<()> {
    if let Ok(metadata) = fs::metadata(output) {
        if metadata.is_dir() {
            return Err(MegaDocError::build(output, "Output path is a directory"));
        }
        if metadata.permissions().readonly() {
            return Err(MegaDocError::build(output, "Output file is read-only"));
        }
    }

    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| MegaDocError::build(output, format!("Cannot create temporary file: {e}")))?;
    temp.write_all(document.as_bytes())
        .and_then(|()| temp.flush())
        .map_err(|e| MegaDocError::build(output, format!("Write failed: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = temp
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
        {
            tracing::debug!(output = %output.display(), error = %e, "could not set output permissions");
        }
    }

    temp.persist(output)
        .map_err(|e| MegaDocError::build(output, format!("Write failed: {}", e.error)))?;
    Ok(())
}
