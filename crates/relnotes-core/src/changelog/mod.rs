//! Keep a Changelog document handling.
//!
//! The changelog is the only persistent state relnotes owns. It is parsed
//! into a light line-based model ([`Document`]) that preserves every byte it
//! does not touch, rewritten in memory, and written back atomically.
//!
//! - [`merge`] builds version entries and merges them into the file.
//! - [`validate`] audits an existing file and reports advisory warnings.

pub mod merge;
pub mod validate;

use std::io::Write;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Default changelog file name, relative to the project root.
pub const DEFAULT_CHANGELOG: &str = "CHANGELOG.md";

/// Key of the staging section.
pub const UNRELEASED: &str = "Unreleased";

/// Header written to a brand new changelog.
pub const STANDARD_HEADER: &str = "\
# Changelog

All notable changes to this project will be documented in this file.

The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.1.0/),
and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).
";

/// Errors from changelog operations.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// Failed to read the changelog.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write the changelog.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A fragment passed for merging does not start with a `## [<version>]` header.
    #[error("changelog fragment does not start with a `## [<version>]` header")]
    MissingFragmentHeader,
}

/// Result alias for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

static LINK_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}\[([^\]]+)\]:\s*(\S+)").expect("valid link definition regex")
});

/// Parse a reference-style link definition line into `(label, url)`.
pub(crate) fn link_definition(line: &str) -> Option<(&str, &str)> {
    let caps = LINK_DEF.captures(line)?;
    let label = caps.get(1)?.as_str();
    let url = caps.get(2)?.as_str();
    Some((label, url))
}

/// Key of a `## [<key>]` section header line.
pub(crate) fn section_key(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("## [")?;
    let end = rest.find(']')?;
    Some(&rest[..end])
}

/// Make free-form markdown safe to place inside a section body.
///
/// Outside code fences, `#` and `##` headings are demoted to `###` and link
/// definitions are escaped, so the text cannot start a section or define a
/// link. An unterminated fence is closed.
pub(crate) fn escape_section_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push_str(line);
        } else if in_fence {
            out.push_str(line);
        } else if let Some(title) = top_heading_text(line) {
            out.push_str("### ");
            out.push_str(title);
        } else if link_definition(line).is_some() {
            let indent = line.len() - line.trim_start().len();
            out.push_str(&line[..indent]);
            out.push('\\');
            out.push_str(&line[indent..]);
        } else {
            out.push_str(line);
        }
    }

    if in_fence {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
    }
    out
}

/// Text after the markers of a level one or two ATX heading.
fn top_heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let rest = trimmed.trim_start_matches('#');
    let level = trimmed.len() - rest.len();
    if !(1..=2).contains(&level) {
        return None;
    }
    if rest.is_empty() || rest.starts_with([' ', '\t', '\r', '\n']) {
        Some(rest.trim_start_matches([' ', '\t']))
    } else {
        None
    }
}

pub(crate) fn is_unreleased(key: &str) -> bool {
    key.eq_ignore_ascii_case(UNRELEASED)
}

/// One `## [<key>]` section: its header line and everything up to the next
/// section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Section {
    pub key: String,
    pub lines: Vec<String>,
}

impl Section {
    pub(crate) fn from_lines(lines: Vec<String>) -> Option<Self> {
        let key = section_key(lines.first()?)?.to_string();
        Some(Self { key, lines })
    }

    /// A header-only section followed by a blank line.
    pub(crate) fn empty(key: &str) -> Self {
        Self {
            key: key.to_string(),
            lines: vec![format!("## [{key}]"), String::new()],
        }
    }

    pub(crate) fn is_unreleased(&self) -> bool {
        is_unreleased(&self.key)
    }

    /// Index of the first body line: after the header and any link
    /// definitions directly beneath it.
    pub(crate) fn body_start(&self) -> usize {
        1 + self.lines[1..]
            .iter()
            .take_while(|l| link_definition(l).is_some())
            .count()
    }

    /// Index just past the last non-blank line (never before the body start).
    pub(crate) fn content_end(&self) -> usize {
        let start = self.body_start();
        self.lines
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .map_or(start, |i| (i + 1).max(start))
    }

    /// Make sure the section ends with a blank line so the next header is
    /// separated from it.
    pub(crate) fn ensure_blank_tail(&mut self) {
        ensure_blank_tail(&mut self.lines);
    }
}

pub(crate) fn ensure_blank_tail(lines: &mut Vec<String>) {
    if lines.last().is_some_and(|l| !l.trim().is_empty()) {
        lines.push(String::new());
    }
}

/// Line-based view of a changelog.
///
/// `preamble` is everything before the first section header, `footer` a
/// trailing block of link definitions after the last section. Rendering an
/// unmodified document reproduces the input exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Document {
    pub preamble: Vec<String>,
    pub sections: Vec<Section>,
    pub footer: Vec<String>,
}

impl Document {
    pub(crate) fn parse(content: &str) -> Self {
        let mut doc = Self::default();
        let mut current: Vec<String> = Vec::new();
        let mut in_fence = false;

        for line in content.split('\n') {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            if !in_fence && section_key(line).is_some() {
                doc.push_block(std::mem::take(&mut current));
            }
            current.push(line.to_string());
        }
        doc.push_block(current);
        doc.split_footer();
        doc
    }

    fn push_block(&mut self, block: Vec<String>) {
        if block.is_empty() {
            return;
        }
        if section_key(&block[0]).is_some() {
            self.sections.extend(Section::from_lines(block));
        } else {
            self.preamble = block;
        }
    }

    /// Peel a trailing run of blank lines and link definitions off the last
    /// section, provided the run holds at least one link definition.
    fn split_footer(&mut self) {
        let Some(last) = self.sections.last_mut() else {
            return;
        };
        let start = last.body_start();
        let content_end = last.lines[start..]
            .iter()
            .rposition(|l| !l.trim().is_empty() && link_definition(l).is_none())
            .map_or(start, |i| start + i + 1);

        let tail = &last.lines[content_end..];
        if !tail.iter().any(|l| link_definition(l).is_some()) {
            return;
        }
        // Leave the separating blank line with the section.
        let split = content_end
            + last.lines[content_end..]
                .iter()
                .take_while(|l| l.trim().is_empty())
                .count();
        self.footer = last.lines.split_off(split);
    }

    pub(crate) fn render(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        lines.extend(self.preamble.iter().map(String::as_str));
        for section in &self.sections {
            lines.extend(section.lines.iter().map(String::as_str));
        }
        lines.extend(self.footer.iter().map(String::as_str));
        lines.join("\n")
    }

    pub(crate) fn unreleased_index(&self) -> Option<usize> {
        self.sections.iter().position(Section::is_unreleased)
    }

    /// Insert `section` at `index`, keeping a blank line between it and
    /// whatever precedes it.
    pub(crate) fn insert_section(&mut self, index: usize, mut section: Section) {
        if index == 0 {
            if !self.preamble.is_empty() {
                ensure_blank_tail(&mut self.preamble);
            }
        } else if let Some(prev) = self.sections.get_mut(index - 1) {
            prev.ensure_blank_tail();
        }
        if index < self.sections.len() || !self.footer.is_empty() {
            section.ensure_blank_tail();
        }
        self.sections.insert(index, section);
    }
}

/// Read a changelog, mapping I/O errors to [`ChangelogError::Read`].
pub fn read_changelog(path: &Utf8Path) -> ChangelogResult<String> {
    std::fs::read_to_string(path).map_err(|source| ChangelogError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a changelog, treating a missing file as empty.
pub fn read_or_empty(path: &Utf8Path) -> ChangelogResult<String> {
    match read_changelog(path) {
        Ok(content) => Ok(content),
        Err(ChangelogError::Read { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

/// Replace `path` with `content` without ever exposing a half-written file.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over the target. A missing parent directory is an error.
pub fn write_atomic(path: &Utf8Path, content: &str) -> ChangelogResult<()> {
    let write_err = |source| ChangelogError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!(%path, bytes = content.len(), "changelog written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Changelog

Intro.

## [Unreleased]

- staged

## [v1.1.0] - 2024-02-01
[v1.1.0]: https://example.com/compare/v1.0.0...v1.1.0

### Features
- b

## [v1.0.0] - 2024-01-01

### Features
- a

[v1.0.0]: https://example.com/releases/tag/v1.0.0
";

    #[test]
    fn parse_render_round_trips() {
        for content in [SAMPLE, "", "# Changelog", "no header at all\n", "## [x]\n```\n## [y]\n```"] {
            assert_eq!(Document::parse(content).render(), content);
        }
    }

    #[test]
    fn parse_splits_sections_and_footer() {
        let doc = Document::parse(SAMPLE);
        let keys: Vec<_> = doc.sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["Unreleased", "v1.1.0", "v1.0.0"]);
        assert_eq!(doc.preamble[0], "# Changelog");
        assert_eq!(
            doc.footer,
            vec!["[v1.0.0]: https://example.com/releases/tag/v1.0.0".to_string(), String::new()]
        );
        assert_eq!(doc.unreleased_index(), Some(0));
    }

    #[test]
    fn own_link_line_is_not_footer() {
        let doc = Document::parse("## [v1.0.0] - 2024-01-01\n[v1.0.0]: https://x\n");
        assert!(doc.footer.is_empty());
        assert_eq!(doc.sections[0].body_start(), 2);
    }

    #[test]
    fn fenced_headers_are_not_sections() {
        let doc = Document::parse("## [v1.0.0]\n```\n## [v0.9.0]\n```\n");
        assert_eq!(doc.sections.len(), 1);
    }

    #[test]
    fn escaping_demotes_top_headings() {
        let text = "Intro.\n## [Upgrade guide]\n# Title\n  ## indented\n### kept\n#hashtag\n";
        assert_eq!(
            escape_section_body(text),
            "Intro.\n### [Upgrade guide]\n### Title\n### indented\n### kept\n#hashtag\n"
        );
    }

    #[test]
    fn escaping_neutralizes_link_definitions() {
        let text = "See [v1.0.0]: https://example.com\n[docs](https://x.y)\n[v1.0.0]: https://example.com\n";
        let escaped = escape_section_body(text);
        assert_eq!(
            escaped,
            "See [v1.0.0]: https://example.com\n[docs](https://x.y)\n\\[v1.0.0]: https://example.com\n"
        );
        assert!(escaped.lines().all(|l| link_definition(l).is_none()));
    }

    #[test]
    fn escaping_leaves_fences_alone_and_closes_them() {
        let closed = "```md\n## [v0.1.0]\n```\n";
        assert_eq!(escape_section_body(closed), closed);

        let open = "Example:\n```\n## [v0.1.0]";
        assert_eq!(escape_section_body(open), "Example:\n```\n## [v0.1.0]\n```\n");
    }

    #[test]
    fn insert_section_keeps_blank_lines() {
        let mut doc = Document::parse("# Changelog\n## [v1.0.0]\n- a");
        doc.insert_section(0, Section::empty(UNRELEASED));
        doc.insert_section(2, Section::from_lines(vec!["## [v0.9.0]".into(), "- z".into()]).unwrap());
        assert_eq!(
            doc.render(),
            "# Changelog\n\n## [Unreleased]\n\n## [v1.0.0]\n- a\n\n## [v0.9.0]\n- z"
        );
    }

    #[test]
    fn parses_link_definitions() {
        assert_eq!(
            link_definition("[v1.0.0]: https://example.com"),
            Some(("v1.0.0", "https://example.com"))
        );
        assert_eq!(link_definition("- [v1.0.0]: nope"), None);
        assert_eq!(link_definition("[v1.0.0] - 2024-01-01"), None);
    }

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("CHANGELOG.md")).unwrap();
        write_atomic(&path, "one").unwrap();
        write_atomic(&path, "two").unwrap();
        assert_eq!(read_changelog(&path).unwrap(), "two");
    }

    #[test]
    fn write_atomic_fails_without_parent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("missing/CHANGELOG.md")).unwrap();
        assert!(matches!(
            write_atomic(&path, "x"),
            Err(ChangelogError::Write { .. })
        ));
        assert!(!path.exists());
    }
}
