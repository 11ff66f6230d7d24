//! Compiled extraction patterns.
//!
//! Each pattern is an independent heuristic with a `path` capture group.
//! They are compiled once per configuration (see
//! [`MegaDocConfig::file_patterns`](crate::MegaDocConfig::file_patterns)).

use regex::Regex;
use strum::{Display, EnumIter, IntoEnumIterator};

/// The extraction heuristics, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PatternKind {
    /// `` `src/main.py` `` ending in an allowed extension.
    InlineCode,
    /// `[label](path)`.
    MarkdownLink,
    /// `# From path` style comment lines inside code blocks.
    CodeComment,
    /// Backtick token containing a path separator.
    BacktickPath,
    /// First token of a bullet or numbered list item.
    ListItem,
    /// `file: path`, `path = path`, `source: path`.
    FilePrefix,
    /// Single- or double-quoted path-like token.
    QuotedPath,
}

impl PatternKind {
    fn source(self, extensions: &str) -> String {
        match self {
            Self::InlineCode => format!(r"`(?P<path>[^`\s]+\.(?i:{extensions}))`"),
            Self::MarkdownLink => {
                r#"\[[^\]\n]*\]\(\s*(?P<path>[^)\s]+)(?:\s+["'][^"')]*["'])?\s*\)"#.to_string()
            }
            Self::CodeComment => {
                r#"(?mi)^[ \t]*(?:#|//|--|;|/\*|<!--)[ \t]*(?:from|file|source|see|in)[ \t]*:?[ \t]+`?(?P<path>[^\s`'"<>*]+)"#
                    .to_string()
            }
            Self::BacktickPath => r"`(?P<path>[^`\s]*[/\\][^`\s]*)`".to_string(),
            Self::ListItem => {
                r"(?m)^[ \t]*(?:[-*+]|\d+[.)])[ \t]+(?:\[[ xX]\][ \t]+)?`?(?P<path>[^\s`]+)"
                    .to_string()
            }
            Self::FilePrefix => {
                r#"(?i)\b(?:file|path|source|filename)[ \t]*[:=][ \t]*[`'"]?(?P<path>[^\s`'"<>]+)"#
                    .to_string()
            }
            Self::QuotedPath => {
                r#"["'](?P<path>[\w\-./\\]+\.[A-Za-z0-9]{1,10})["']"#.to_string()
            }
        }
    }
}

/// One compiled heuristic.
#[derive(Debug, Clone)]
pub struct ExtractionPattern {
    kind: PatternKind,
    regex: Regex,
}

impl ExtractionPattern {
    /// Which heuristic this is.
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// The compiled regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Raw candidate strings found in `text`.
    pub fn candidates<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.name("path"))
            .map(|m| m.as_str())
            .collect()
    }
}

/// The ordered set of compiled heuristics.
#[derive(Debug, Clone)]
pub struct FilePatterns {
    patterns: Vec<ExtractionPattern>,
}

impl FilePatterns {
    /// Compile every heuristic for the given extension allow-list.
    ///
    /// A pattern that fails to compile is logged and left out.
    pub fn compile<'a>(extensions: impl IntoIterator<Item = &'a str>) -> Self {
        let mut exts: Vec<String> = extensions.into_iter().map(regex::escape).collect();
        // Longest first so `hpp` is tried before `h`.
        exts.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = if exts.is_empty() {
            // Empty class: matches nothing.
            r"[^\s\S]".to_string()
        } else {
            exts.join("|")
        };

        let patterns = PatternKind::iter()
            .filter_map(|kind| match Regex::new(&kind.source(&alternation)) {
                Ok(regex) => Some(ExtractionPattern { kind, regex }),
                Err(err) => {
                    tracing::warn!(pattern = %kind, error = %err, "failed to compile extraction pattern");
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern compiled.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Iterate in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, ExtractionPattern> {
        self.patterns.iter()
    }

    /// Look up one heuristic.
    pub fn get(&self, kind: PatternKind) -> Option<&ExtractionPattern> {
        self.patterns.iter().find(|p| p.kind == kind)
    }
}

impl<'a> IntoIterator for &'a FilePatterns {
    type Item = &'a ExtractionPattern;
    type IntoIter = std::slice::Iter<'a, ExtractionPattern>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
