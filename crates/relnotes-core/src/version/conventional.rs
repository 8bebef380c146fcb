//! Conventional-commit parsing.
//!
//! Turns one raw commit message into a [`ReleaseItem`]. The first line is
//! matched against `type(scope)!: description`; subsequent lines are scanned
//! for `BREAKING CHANGE:` / `BREAKING-CHANGE:` footers and issue-closing
//! keywords.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<type>[A-Za-z]+)(?:\((?P<scope>[^)]*)\))?(?P<bang>!)?:\s*(?P<desc>.+)$")
        .expect("valid commit header regex")
});

static BREAKING_FOOTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^BREAKING[ -]CHANGE:\s*(.+)").expect("valid breaking footer regex")
});

static PR_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)").expect("valid PR reference regex"));

static ISSUE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+#(\d+)")
        .expect("valid issue reference regex")
});

/// Conventional-commit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    /// A new feature.
    Feat,
    /// A bug fix.
    Fix,
    /// Documentation only.
    Docs,
    /// Formatting, whitespace.
    Style,
    /// Code change that neither fixes a bug nor adds a feature.
    Refactor,
    /// Performance improvement.
    Perf,
    /// Tests only.
    Test,
    /// Build system or dependencies.
    Build,
    /// CI configuration.
    Ci,
    /// Maintenance.
    Chore,
    /// Reverts a previous commit.
    Revert,
    /// Anything that is not a recognized conventional commit.
    Other,
}

impl CommitType {
    /// Look up a type keyword (case-insensitive). Unknown keywords yield `None`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let ty = match keyword.to_ascii_lowercase().as_str() {
            "feat" => Self::Feat,
            "fix" => Self::Fix,
            "docs" => Self::Docs,
            "style" => Self::Style,
            "refactor" => Self::Refactor,
            "perf" => Self::Perf,
            "test" => Self::Test,
            "build" => Self::Build,
            "ci" => Self::Ci,
            "chore" => Self::Chore,
            "revert" => Self::Revert,
            _ => return None,
        };
        Some(ty)
    }

    /// The keyword as written in a commit header.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feat => "feat",
            Self::Fix => "fix",
            Self::Docs => "docs",
            Self::Style => "style",
            Self::Refactor => "refactor",
            Self::Perf => "perf",
            Self::Test => "test",
            Self::Build => "build",
            Self::Ci => "ci",
            Self::Chore => "chore",
            Self::Revert => "revert",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for CommitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified unit of change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseItem {
    /// Conventional-commit type.
    #[serde(rename = "type")]
    pub commit_type: CommitType,
    /// Optional scope, e.g. a subsystem name.
    pub scope: Option<String>,
    /// Trimmed description from the first line, without the `(#N)` suffix.
    pub description: String,
    /// Whether the commit is marked as a breaking change.
    pub breaking: bool,
    /// Pull request number from a `(#N)` reference on the first line.
    pub pr_number: Option<String>,
    /// Issues referenced by `Closes #N` style keywords anywhere in the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub closes: Vec<String>,
}

/// Parse a raw commit message into a [`ReleaseItem`].
///
/// Commits whose first line does not follow the grammar, or whose type is not
/// a known keyword, become [`CommitType::Other`] with the whole first line as
/// the description.
pub fn parse_commit(message: &str) -> ReleaseItem {
    let mut lines = message.lines();
    let first = lines.next().unwrap_or_default().trim();

    let pr_number = PR_REF.captures(first).map(|caps| caps[1].to_string());
    let footer_breaking = lines.any(|line| BREAKING_FOOTER.is_match(line.trim_start()));
    let closes = ISSUE_REF
        .captures_iter(message)
        .map(|caps| caps[1].to_string())
        .collect();

    let parsed = HEADER.captures(first).and_then(|caps| {
        let commit_type = CommitType::from_keyword(&caps["type"])?;
        let scope = caps
            .name("scope")
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .map(String::from);
        let bang = caps.name("bang").is_some();
        Some((commit_type, scope, bang, caps["desc"].to_string()))
    });

    match parsed {
        Some((commit_type, scope, bang, desc)) => ReleaseItem {
            commit_type,
            scope,
            description: strip_pr_suffix(&desc),
            breaking: bang || footer_breaking,
            pr_number,
            closes,
        },
        None => ReleaseItem {
            commit_type: CommitType::Other,
            scope: None,
            description: first.to_string(),
            breaking: footer_breaking,
            pr_number,
            closes,
        },
    }
}

/// Remove `(#N)` references from a description and tidy whitespace.
fn strip_pr_suffix(description: &str) -> String {
    let stripped = PR_REF.replace_all(description, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
