//! Release statistics: diff stats and contributors since the previous tag.
//!
//! Passed through untouched to the notes generator. Non-fatal: returns
//! `None` on any git error (logs a warning, never blocks the release).

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::git::History;

/// Maximum number of contributors to include in release stats.
const CONTRIBUTOR_LIMIT: usize = 20;

/// Release statistics gathered from git between two refs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStats {
    /// Number of commits in the release.
    pub commit_count: usize,
    /// Number of files changed.
    pub files_changed: usize,
    /// Total lines inserted.
    pub insertions: usize,
    /// Total lines deleted.
    pub deletions: usize,
    /// Contributors and their commit counts.
    pub contributors: Vec<Contributor>,
}

/// A contributor to the release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Contributor name (from git shortlog).
    pub name: String,
    /// Number of commits by this contributor.
    pub count: usize,
}

/// Compute release statistics between `previous_tag` and `HEAD`.
pub fn compute_stats(history: &dyn History, previous_tag: Option<&str>) -> Option<ReleaseStats> {
    let diff = match history.diff_stats(previous_tag) {
        Ok(d) => d,
        Err(e) => {
            warn!(%e, "failed to gather release stats, skipping");
            return None;
        }
    };

    let contributors = match history.contributors(previous_tag, CONTRIBUTOR_LIMIT) {
        Ok(c) => c
            .into_iter()
            .map(|(name, count)| Contributor { name, count })
            .collect(),
        Err(e) => {
            warn!(%e, "failed to gather contributors, continuing without");
            Vec::new()
        }
    };

    Some(ReleaseStats {
        commit_count: diff.commit_count,
        files_changed: diff.files_changed,
        insertions: diff.insertions,
        deletions: diff.deletions,
        contributors,
    })
}
