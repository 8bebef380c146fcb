//! Read-only changelog audit.
//!
//! Shape problems are never errors: a hand-edited changelog must stay
//! usable. Instead every released version section is checked independently
//! and problems come back as [`ChangelogWarning`]s.

use std::sync::LazyLock;

use camino::Utf8Path;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{ChangelogResult, Document, Section, link_definition, read_changelog};

/// Default minimum body length, in characters, below which a section is
/// reported as `short_content`.
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 30;

static DATED_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## \[[^\]]+\]\s+-\s+(\d{4}-\d{2}-\d{2})\s*$").expect("valid dated header regex")
});

/// What a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Header lacks a `- YYYY-MM-DD` date.
    MissingDate,
    /// No `[<version>]: <url>` definition anywhere in the document.
    MissingLink,
    /// No `### ` subsection in the body.
    NoSections,
    /// Non-empty body shorter than the configured minimum.
    ShortContent,
}

impl WarningKind {
    /// Stable identifier, as used in JSON output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingDate => "missing_date",
            Self::MissingLink => "missing_link",
            Self::NoSections => "no_sections",
            Self::ShortContent => "short_content",
        }
    }
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advisory finding for one version section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogWarning {
    /// Kind of problem.
    #[serde(rename = "type")]
    pub kind: WarningKind,
    /// Version key of the section.
    pub version: String,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for ChangelogWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.version, self.kind, self.message)
    }
}

/// Audit the changelog at `path`.
#[instrument(fields(%path))]
pub fn validate_changelog(
    path: &Utf8Path,
    min_content_length: usize,
) -> ChangelogResult<Vec<ChangelogWarning>> {
    let content = read_changelog(path)?;
    let warnings = validate_content(&content, min_content_length);
    debug!(count = warnings.len(), "changelog validated");
    Ok(warnings)
}

/// Audit changelog text. Unreleased is skipped; every other section gets
/// four independent checks.
pub fn validate_content(content: &str, min_content_length: usize) -> Vec<ChangelogWarning> {
    let doc = Document::parse(content);
    let linked: Vec<&str> = content
        .lines()
        .filter_map(|l| link_definition(l).map(|(label, _)| label))
        .collect();

    let mut warnings = Vec::new();
    for section in doc.sections.iter().filter(|s| !s.is_unreleased()) {
        let version = section.key.as_str();
        let warn = |kind, message: String| ChangelogWarning {
            kind,
            version: version.to_string(),
            message,
        };

        if !has_valid_date(&section.lines[0]) {
            warnings.push(warn(
                WarningKind::MissingDate,
                "header has no `- YYYY-MM-DD` date".into(),
            ));
        }
        if !linked.contains(&version) {
            warnings.push(warn(
                WarningKind::MissingLink,
                format!("no `[{version}]: <url>` link definition"),
            ));
        }
        if !section.lines.iter().any(|l| l.starts_with("### ")) {
            warnings.push(warn(
                WarningKind::NoSections,
                "no `###` subsections".into(),
            ));
        }
        // An empty body already shows up as `no_sections`.
        let length = body_length(section);
        if length > 0 && length < min_content_length {
            warnings.push(warn(
                WarningKind::ShortContent,
                format!("only {length} characters of content (minimum {min_content_length})"),
            ));
        }
    }
    warnings
}

fn has_valid_date(header: &str) -> bool {
    DATED_HEADER
        .captures(header)
        .is_some_and(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").is_ok())
}

/// Characters in the body, excluding the header and the section's own link
/// definition.
fn body_length(section: &Section) -> usize {
    section.lines[1..]
        .iter()
        .filter(|l| link_definition(l).is_none_or(|(label, _)| label != section.key))
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .chars()
        .count()
}
