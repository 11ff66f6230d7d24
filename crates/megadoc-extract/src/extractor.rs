//! Heuristic extraction of file paths from review text.

use std::sync::Arc;

use itertools::Itertools;
use strum::Display;

use megadoc_core::{MegaDocConfig, PatternKind};

use crate::policy::PathPolicy;

/// Trailing punctuation left behind by prose around a path.
const TRAILING_PUNCTUATION: &[char] = &[',', ';', ':', '!', '?', '.', '"', '\'', '`'];

/// Why a candidate was dropped during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    /// Nothing left after trimming punctuation and fragments.
    Empty,
    /// Contains a URL scheme separator.
    Url,
    /// Contains whitespace.
    Whitespace,
    /// Contains a NUL or other control character.
    ControlCharacter,
    /// Contains a `%XX` escape.
    PercentEncoded,
    /// Rooted, home-relative or drive-qualified.
    Absolute,
    /// Neither an allowed extension nor a special filename.
    UnsupportedExtension,
}

/// Extracts safe relative file paths from review text.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    config: Arc<MegaDocConfig>,
    policy: PathPolicy,
}

impl FileExtractor {
    /// Create an extractor bound to a configuration.
    pub fn new(config: Arc<MegaDocConfig>) -> Self {
        let policy = PathPolicy::from_config(&config);
        Self { config, policy }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Arc<MegaDocConfig> {
        &self.config
    }

    /// Extract every referenced path, sorted and deduplicated.
    pub fn extract_file_paths(&self, text: &str) -> Vec<String> {
        let paths: Vec<String> = self
            .config
            .file_patterns()
            .iter()
            .flat_map(|pattern| {
                pattern
                    .candidates(text)
                    .into_iter()
                    .map(move |candidate| (pattern.kind(), candidate))
            })
            .filter_map(|(kind, candidate)| self.accept(kind, candidate))
            .sorted()
            .dedup()
            .collect();

        tracing::debug!(count = paths.len(), "extracted file paths");
        paths
    }

    /// Normalize a raw candidate into a relative forward-slash path.
    ///
    /// Returns `None` when the candidate is not a plausible local file path.
    /// The traversal and depth policy is not applied here.
    pub fn normalize_path(&self, candidate: &str) -> Option<String> {
        self.try_normalize(candidate).ok()
    }

    /// Whether `path` normalizes and passes the traversal and depth policy.
    pub fn is_valid_path(&self, path: &str) -> bool {
        self.normalize_path(path)
            .is_some_and(|normalized| self.policy.check(&normalized).is_ok())
    }

    fn accept(&self, kind: PatternKind, candidate: &str) -> Option<String> {
        let normalized = match self.try_normalize(candidate) {
            Ok(path) => path,
            Err(reason) => {
                tracing::trace!(pattern = %kind, candidate, %reason, "rejected candidate");
                return None;
            }
        };

        if let Err(err) = self.policy.check(&normalized) {
            tracing::trace!(pattern = %kind, candidate, error = %err, "rejected candidate");
            return None;
        }
        Some(normalized)
    }

    fn try_normalize(&self, candidate: &str) -> Result<String, Rejection> {
        let trimmed = candidate.trim().trim_end_matches(TRAILING_PUNCTUATION);
        // Markdown anchors and query strings are not part of the path.
        let trimmed = trimmed.split(['#', '?']).next().unwrap_or_default();

        if trimmed.is_empty() {
            return Err(Rejection::Empty);
        }
        if trimmed.contains("://") {
            return Err(Rejection::Url);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(Rejection::Whitespace);
        }
        if trimmed.chars().any(char::is_control) {
            return Err(Rejection::ControlCharacter);
        }
        if is_percent_encoded(trimmed) {
            return Err(Rejection::PercentEncoded);
        }
        if is_absolute(trimmed) {
            return Err(Rejection::Absolute);
        }

        let unified = trimmed.replace('\\', "/");
        let normalized = unified
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .join("/");

        if normalized.is_empty() {
            return Err(Rejection::Empty);
        }
        if !self.config.is_eligible_file(&normalized) {
            return Err(Rejection::UnsupportedExtension);
        }
        Ok(normalized)
    }
}

fn is_percent_encoded(text: &str) -> bool {
    text.as_bytes()
        .windows(3)
        .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
}

fn is_absolute(text: &str) -> bool {
    let bytes = text.as_bytes();
    match bytes {
        [b'/' | b'\\' | b'~', ..] => true,
        [drive, b':', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}
