//! Build statistics and the human-readable summary.

use std::fmt::Write as _;
use std::path::PathBuf;

use humansize::{BINARY, format_size};
use serde::{Deserialize, Serialize};

use megadoc_core::MegaDocConfig;

/// A file that could not be included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Review file, or a label for the explicit input list.
    pub review_file: String,
    /// Requested output path.
    pub output_file: PathBuf,
    /// Files actually written: the output path, or one file per part.
    pub output_files: Vec<PathBuf>,
    pub total_files_found: usize,
    pub processed_files: usize,
    /// Paths included in the document, in order.
    pub included_files: Vec<String>,
    pub failed_files: Vec<FileFailure>,
    pub processing_time_seconds: f64,
    /// Bytes written across all output files.
    pub output_bytes: u64,
}

impl BuildStats {
    /// Fraction of found files that were included.
    pub fn success_rate(&self) -> f64 {
        if self.total_files_found == 0 {
            return 0.0;
        }
        self.processed_files as f64 / self.total_files_found as f64
    }

    /// Whether every found file was included.
    pub fn is_complete(&self) -> bool {
        self.failed_files.is_empty()
    }

    /// Multi-line summary, truncated per the preview limits in `config`.
    pub fn summary(&self, config: &MegaDocConfig) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Processed {}/{} files in {:.2}s",
            self.processed_files, self.total_files_found, self.processing_time_seconds
        );
        if self.output_files.len() > 1 {
            let _ = writeln!(
                out,
                "Output: {} parts ({})",
                self.output_files.len(),
                format_size(self.output_bytes, BINARY)
            );
            for path in &self.output_files {
                let _ = writeln!(out, "  - {}", path.display());
            }
        } else {
            let _ = writeln!(
                out,
                "Output: {} ({})",
                self.output_file.display(),
                format_size(self.output_bytes, BINARY)
            );
        }

        if !self.included_files.is_empty() {
            out.push_str("Included files:\n");
            preview(&mut out, &self.included_files, config.max_preview_files, |path| {
                path.clone()
            });
        }

        if !self.failed_files.is_empty() {
            let _ = writeln!(out, "Failed files ({}):", self.failed_files.len());
            preview(&mut out, &self.failed_files, config.max_error_preview, |failure| {
                format!("{}: {}", failure.path, failure.error)
            });
        }
        out
    }
}

fn preview<T>(out: &mut String, items: &[T], limit: usize, label: impl Fn(&T) -> String) {
    for item in items.iter().take(limit) {
        let _ = writeln!(out, "  - {}", label(item));
    }
    if items.len() > limit {
        let _ = writeln!(out, "  ... and {} more", items.len() - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(found: usize, failed: usize) -> BuildStats {
        BuildStats {
            review_file: "review.md".into(),
            output_file: PathBuf::from("out/doc.md"),
            output_files: vec![PathBuf::from("out/doc.md")],
            total_files_found: found,
            processed_files: found - failed,
            included_files: (0..found - failed).map(|i| format!("src/f{i}.py")).collect(),
            failed_files: (0..failed)
                .map(|i| FileFailure {
                    path: format!("gone{i}.py"),
                    error: "Validation failed".into(),
                })
                .collect(),
            processing_time_seconds: 0.25,
            output_bytes: 2048,
        }
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(stats(4, 1).success_rate(), 0.75);
        assert_eq!(stats(0, 0).success_rate(), 0.0);
        assert!(stats(3, 0).is_complete());
    }

    #[test]
    fn test_summary_truncates() {
        let mut config = MegaDocConfig::default();
        config.max_preview_files = 2;
        config.max_error_preview = 1;
        let summary = stats(6, 3).summary(&config);

        assert!(summary.starts_with("Processed 3/6 files in 0.25s\n"));
        assert!(summary.contains("Output: out/doc.md ("));
        assert!(summary.contains("  - src/f1.py\n  ... and 1 more\n"));
        assert!(summary.contains("Failed files (3):\n  - gone0.py: Validation failed\n  ... and 2 more\n"));
    }

    #[test]
    fn test_stats_serialize() {
        let value = serde_json::to_value(stats(2, 1)).unwrap();
        assert_eq!(value["total_files_found"], 2);
        assert_eq!(value["failed_files"][0]["path"], "gone0.py");
    }

    #[test]
    fn test_summary_lists_parts() {
        let mut stats = stats(2, 0);
        stats.output_files = vec![PathBuf::from("out/doc_part1.md"), PathBuf::from("out/doc_part2.md")];
        let summary = stats.summary(&MegaDocConfig::default());
        assert!(summary.contains("Output: 2 parts ("));
        assert!(summary.contains("  - out/doc_part2.md\n"));
    }
}
