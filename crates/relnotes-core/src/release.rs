//! Release planning: classify commits and resolve the next version.
//!
//! [`plan_release`] reads history through a [`History`] and produces a
//! [`Release`]. [`Release::from_commits`] is the pure core of that step and
//! is what most tests exercise.
//!
//! # Version resolution
//!
//! Applied in strict priority order against the previous tag:
//!
//! 1. any breaking item ⇒ major
//! 2. any feature ⇒ minor
//! 3. any fix or improvement ⇒ patch
//! 4. otherwise the version is left unchanged but still labelled `patch`
//!
//! The last rule mirrors long-standing behaviour and is pinned by a test
//! rather than silently changed.

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::git::{Commit, GitError, History};
use crate::stats::{self, ReleaseStats};
use crate::version::conventional::{CommitType, ReleaseItem, parse_commit};
use crate::version::{BumpLevel, format_tag, next_version, previous_version_from_tag};

/// Errors from release planning.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// No commits since the previous tag.
    #[error("nothing to release: no commits since {tag}")]
    NoCommitsSinceTag {
        /// The previous tag.
        tag: String,
    },

    /// The repository has no commits at all.
    #[error("nothing to release: the repository has no commits")]
    EmptyRepository,

    /// Reading history failed.
    #[error("failed to read git history: {0}")]
    Git(#[from] GitError),
}

impl ReleaseError {
    /// Whether this is the expected "nothing to release" steady state rather
    /// than a failure.
    pub const fn is_nothing_to_release(&self) -> bool {
        matches!(self, Self::NoCommitsSinceTag { .. } | Self::EmptyRepository)
    }
}

/// Result alias for release planning.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// The aggregate for one release cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Previous version tag, normalized (`v0.0.0` when there was none).
    pub previous_version: String,
    /// The raw previous tag as found in the repository, if any.
    pub previous_tag: Option<String>,
    /// The computed version tag.
    pub version: String,
    /// Bump applied to reach `version`.
    pub version_bump: BumpLevel,
    /// Raw commits, newest first.
    pub all_commits: Vec<Commit>,

    /// Breaking changes of any type.
    pub breaking: Vec<ReleaseItem>,
    /// New features.
    pub features: Vec<ReleaseItem>,
    /// Bug fixes.
    pub bug_fixes: Vec<ReleaseItem>,
    /// Performance improvements and refactors.
    pub improvements: Vec<ReleaseItem>,
    /// Documentation changes.
    pub documentation: Vec<ReleaseItem>,
    /// Everything else, including non-conventional commits.
    pub other: Vec<ReleaseItem>,

    /// Issues closed by commits in this release, first-seen order.
    pub closed_issues: Vec<String>,
    /// Pull requests merged in this release, first-seen order.
    pub merged_prs: Vec<String>,
    /// Diff statistics and contributors, when gathered.
    pub stats: Option<ReleaseStats>,
}

impl Release {
    /// Classify `commits` (newest first) made since `previous_tag` and
    /// resolve the next version.
    ///
    /// Pure: no I/O. Callers are responsible for rejecting an empty commit list.
    pub fn from_commits(previous_tag: Option<&str>, commits: Vec<Commit>) -> Self {
        let previous = previous_version_from_tag(previous_tag);

        let mut release = Self {
            previous_version: format_tag(&previous),
            previous_tag: previous_tag.map(String::from),
            version: String::new(),
            version_bump: BumpLevel::Patch,
            all_commits: Vec::new(),
            breaking: Vec::new(),
            features: Vec::new(),
            bug_fixes: Vec::new(),
            improvements: Vec::new(),
            documentation: Vec::new(),
            other: Vec::new(),
            closed_issues: Vec::new(),
            merged_prs: Vec::new(),
            stats: None,
        };

        for commit in &commits {
            release.push_item(parse_commit(&commit.message));
        }
        release.all_commits = commits;

        let (next, bump) = release.resolve_version(&previous);
        release.version = format_tag(&next);
        release.version_bump = bump;
        release
    }

    fn push_item(&mut self, item: ReleaseItem) {
        for issue in &item.closes {
            push_unique(&mut self.closed_issues, issue);
        }
        if let Some(ref pr) = item.pr_number {
            push_unique(&mut self.merged_prs, pr);
        }

        let bucket = if item.breaking {
            &mut self.breaking
        } else {
            match item.commit_type {
                CommitType::Feat => &mut self.features,
                CommitType::Fix => &mut self.bug_fixes,
                CommitType::Perf | CommitType::Refactor => &mut self.improvements,
                CommitType::Docs => &mut self.documentation,
                _ => &mut self.other,
            }
        };
        bucket.push(item);
    }

    fn resolve_version(&self, previous: &Version) -> (Version, BumpLevel) {
        if !self.breaking.is_empty() {
            (next_version(previous, BumpLevel::Major), BumpLevel::Major)
        } else if !self.features.is_empty() {
            (next_version(previous, BumpLevel::Minor), BumpLevel::Minor)
        } else if !self.bug_fixes.is_empty() || !self.improvements.is_empty() {
            (next_version(previous, BumpLevel::Patch), BumpLevel::Patch)
        } else {
            (previous.clone(), BumpLevel::Patch)
        }
    }

    /// Total number of classified items across all buckets.
    pub fn item_count(&self) -> usize {
        self.breaking.len()
            + self.features.len()
            + self.bug_fixes.len()
            + self.improvements.len()
            + self.documentation.len()
            + self.other.len()
    }

    /// Whether resolution left the version unchanged (only docs/other items).
    pub fn is_unchanged(&self) -> bool {
        self.version == self.previous_version
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Options for [`plan_release`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Skip gathering diff statistics and contributors.
    pub no_stats: bool,
}

/// Read history since the last tag and build the [`Release`].
///
/// Fails with [`ReleaseError::EmptyRepository`] or
/// [`ReleaseError::NoCommitsSinceTag`] when there is nothing to release.
#[instrument(skip(history))]
pub fn plan_release(history: &dyn History, options: PlanOptions) -> ReleaseResult<Release> {
    if history.commit_count()? == 0 {
        return Err(ReleaseError::EmptyRepository);
    }

    let tag = history.last_tag()?;
    let commits = history.commits_since(tag.as_deref())?;
    if commits.is_empty() {
        return Err(ReleaseError::NoCommitsSinceTag {
            tag: tag.unwrap_or_else(|| "the beginning of history".into()),
        });
    }

    let mut release = Release::from_commits(tag.as_deref(), commits);
    debug!(
        breaking = release.breaking.len(),
        features = release.features.len(),
        fixes = release.bug_fixes.len(),
        improvements = release.improvements.len(),
        docs = release.documentation.len(),
        other = release.other.len(),
        "classified commits"
    );

    if !options.no_stats {
        release.stats = stats::compute_stats(history, tag.as_deref());
    }

    info!(
        previous = %release.previous_version,
        version = %release.version,
        bump = %release.version_bump,
        "resolved next version"
    );
    Ok(release)
}
