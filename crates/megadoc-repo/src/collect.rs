//! Eligible-file discovery for directory mode.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use jwalk::{Parallelism, WalkDir};

use megadoc_core::{MegaDocConfig, MegaDocError, Result};

/// Directory names never descended into.
pub const SKIPPED_DIRECTORIES: &[&str] = &["build", "target", "__pycache__", "node_modules"];

/// Collect eligible files below each of `dirs`.
///
/// Directories are resolved against `base`. Hidden entries and
/// [`SKIPPED_DIRECTORIES`] are skipped. Returned paths are relative to `base`
/// with forward slashes, sorted and deduplicated.
pub fn collect_directory_files(
    base: &Path,
    dirs: &[PathBuf],
    config: &MegaDocConfig,
) -> Result<Vec<String>> {
    let mut found = Vec::new();

    for dir in dirs {
        let root = base.join(dir);
        if !root.is_dir() {
            return Err(MegaDocError::validation(
                dir.display().to_string(),
                "Not a directory",
            ));
        }

        let walker = WalkDir::new(&root)
            .parallelism(Parallelism::Serial)
            .skip_hidden(true)
            .sort(true)
            .process_read_dir(|_, _, _, children| {
                children.retain(|entry| {
                    entry.as_ref().map_or(true, |entry| {
                        !(entry.file_type().is_dir()
                            && SKIPPED_DIRECTORIES
                                .iter()
                                .any(|skip| entry.file_name() == *skip))
                    })
                });
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !config.is_eligible_file(&name) {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(base).unwrap_or(path.as_path());
            found.push(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .join("/"),
            );
        }
    }

    let files: Vec<String> = found.into_iter().sorted().dedup().collect();
    tracing::debug!(count = files.len(), "collected directory files");
    Ok(files)
}
