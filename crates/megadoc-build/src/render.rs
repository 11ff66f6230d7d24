//! Markdown rendering of the mega document.

use std::fmt::Write as _;

use chrono::{DateTime, Local};

use megadoc_core::FileRecord;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Document-level metadata printed above the table of contents.
#[derive(Debug, Clone)]
pub struct DocumentHeader<'a> {
    pub title: &'a str,
    pub source: &'a str,
    pub description: Option<&'a str>,
    pub generated: DateTime<Local>,
    /// Number of extracted paths across every part.
    pub total_files: usize,
    /// `(part, parts)` when the document is split, both 1-based.
    pub part: Option<(usize, usize)>,
    /// Bug report printed before the table of contents.
    pub bug_report: Option<&'a str>,
}

/// A file that was read successfully, with its position in the path list.
#[derive(Debug, Clone)]
pub struct RenderedFile {
    /// 1-based position among all extracted paths.
    pub number: usize,
    pub path: String,
    pub content: String,
    pub record: FileRecord,
}

/// Backtick fence long enough to wrap `content`.
pub fn code_fence(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

/// Render one document, or one part of a split document.
///
/// `paths` are the extracted paths covered by this document, numbered from
/// `first_number`. `files` holds the subset that was read. Every path is
/// linked from the table of contents; files that could not be read keep their
/// number but have no section.
pub fn render_document(
    header: &DocumentHeader<'_>,
    paths: &[String],
    first_number: usize,
    files: &[RenderedFile],
) -> String {
    let total = header.total_files;
    let body_size: usize = files.iter().map(|f| f.content.len() + 256).sum();
    let report_size = header.bug_report.map_or(0, str::len);
    let mut out = String::with_capacity(body_size + report_size + 64 * paths.len() + 512);

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# {}\n", header.title);
    if let Some((part, parts)) = header.part {
        let _ = writeln!(out, "**Part {part} of {parts}**\n");
    }
    let _ = writeln!(out, "**Generated**: {}", header.generated.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "**Source**: {}", header.source);
    if let Some(description) = header.description {
        let _ = writeln!(out, "**Description**: {description}");
    }
    let _ = writeln!(out, "**Total Files**: {total}");
    if header.part.is_some() {
        let _ = writeln!(out, "**Files In Part**: {}", paths.len());
    }
    out.push_str("\n---\n\n");

    if let Some(report) = header.bug_report {
        out.push_str("## BUG REPORT\n\n");
        out.push_str(report.trim_end());
        out.push_str("\n\n---\n\n");
    }

    out.push_str("## TABLE OF CONTENTS\n\n");
    for (idx, path) in paths.iter().enumerate() {
        let number = first_number + idx;
        let _ = writeln!(out, "{number}. [{path}](#file-{number})");
    }
    out.push_str("\n---\n");

    for file in files {
        render_file(&mut out, file, total);
    }
    out
}

fn render_file(out: &mut String, file: &RenderedFile, total: usize) {
    let number = file.number;
    let record = &file.record;
    let lines = file.content.lines().count();
    let kind = if record.extension.is_empty() {
        "none".to_string()
    } else {
        format!(".{}", record.extension)
    };
    let fence = code_fence(&file.content);

    let _ = writeln!(out, "\n<a id=\"file-{number}\"></a>");
    let _ = writeln!(out, "## FILE {number} of {total}: {}\n", file.path);
    out.push_str("**File Information**:\n");
    let _ = writeln!(out, "- **Path**: `{}`", file.path);
    let _ = writeln!(out, "- **Size**: {lines} lines");
    let _ = writeln!(
        out,
        "- **Modified**: {}",
        record.modified_local().format(TIMESTAMP_FORMAT)
    );
    let _ = writeln!(out, "- **Type**: {kind}\n");

    let _ = writeln!(out, "{fence}text");
    out.push_str(&file.content);
    if !file.content.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "{fence}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn rendered(number: usize, path: &str, content: &str) -> RenderedFile {
        RenderedFile {
            number,
            path: path.to_string(),
            content: content.to_string(),
            record: FileRecord {
                path: PathBuf::from(path),
                size: content.len() as u64,
                modified: SystemTime::now(),
                created: None,
                extension: FileRecord::extension_of(std::path::Path::new(path)),
                is_readable: true,
                permissions: None,
            },
        }
    }

    fn header() -> DocumentHeader<'static> {
        DocumentHeader {
            title: "Review Bundle",
            source: "review.md",
            description: None,
            generated: Local::now(),
            total_files: 2,
            part: None,
            bug_report: None,
        }
    }

    #[test]
    fn test_code_fence() {
        assert_eq!(code_fence("plain"), "```");
        assert_eq!(code_fence("has ``` inside"), "````");
        assert_eq!(code_fence("````` five"), "``````");
    }

    #[test]
    fn test_render_structure() {
        let paths = vec!["src/main.py".to_string(), "include/header.h".to_string()];
        let files = vec![
            rendered(1, "src/main.py", "print('hi')\n"),
            rendered(2, "include/header.h", "#pragma once"),
        ];
        let doc = render_document(&header(), &paths, 1, &files);

        assert!(doc.starts_with("# Review Bundle\n\n**Generated**: "));
        assert!(doc.contains("**Source**: review.md\n"));
        assert!(!doc.contains("**Description**"));
        assert!(doc.contains("**Total Files**: 2\n"));
        assert!(doc.contains("## TABLE OF CONTENTS\n\n1. [src/main.py](#file-1)\n2. [include/header.h](#file-2)\n"));
        assert!(doc.contains("<a id=\"file-2\"></a>\n## FILE 2 of 2: include/header.h\n"));
        assert!(doc.contains("- **Path**: `src/main.py`\n- **Size**: 1 lines\n"));
        assert!(doc.contains("- **Type**: .h\n\n```text\n#pragma once\n```\n"));
    }

    #[test]
    fn test_missing_file_keeps_numbering() {
        let paths = vec!["a.py".to_string(), "b.py".to_string(), "c.py".to_string()];
        let files = vec![rendered(1, "a.py", "a"), rendered(3, "c.py", "c")];
        let mut header = header();
        header.total_files = 3;
        let doc = render_document(&header, &paths, 1, &files);

        assert!(doc.contains("2. [b.py](#file-2)\n"));
        assert!(!doc.contains("<a id=\"file-2\">"));
        assert!(doc.contains("## FILE 3 of 3: c.py"));
        assert!(!doc.contains("## FILE 2 of 3"));
    }

    #[test]
    fn test_description_and_special_file_type() {
        let mut header = header();
        header.description = Some("Weekly review");
        header.total_files = 1;
        let paths = vec!["Makefile".to_string()];
        let files = vec![rendered(1, "Makefile", "all:\n\ttrue\n")];
        let doc = render_document(&header, &paths, 1, &files);

        assert!(doc.contains("**Description**: Weekly review\n"));
        assert!(doc.contains("- **Type**: none\n"));
        assert!(doc.contains("- **Size**: 2 lines\n"));
    }

    #[test]
    fn test_part_header_and_numbering() {
        let mut header = header();
        header.total_files = 5;
        header.part = Some((2, 3));
        let paths = vec!["c.py".to_string(), "d.py".to_string()];
        let files = vec![rendered(3, "c.py", "c"), rendered(4, "d.py", "d")];
        let doc = render_document(&header, &paths, 3, &files);

        assert!(doc.starts_with("# Review Bundle\n\n**Part 2 of 3**\n\n**Generated**: "));
        assert!(doc.contains("**Total Files**: 5\n**Files In Part**: 2\n"));
        assert!(doc.contains("## TABLE OF CONTENTS\n\n3. [c.py](#file-3)\n4. [d.py](#file-4)\n\n"));
        assert!(doc.contains("## FILE 4 of 5: d.py"));
        assert!(!doc.contains("BUG REPORT"));
    }

    #[test]
    fn test_bug_report_precedes_contents() {
        let mut header = header();
        header.bug_report = Some("Crash on startup.\n\n");
        let paths = vec!["src/main.py".to_string()];
        let doc = render_document(&header, &paths, 1, &[rendered(1, "src/main.py", "x")]);

        let report = doc.find("## BUG REPORT\n\nCrash on startup.\n\n---\n").unwrap();
        let toc = doc.find("## TABLE OF CONTENTS").unwrap();
        assert!(report < toc);
    }
}
