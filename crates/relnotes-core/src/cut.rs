//! Cutting a release: classify, synthesize, merge, publish.
//!
//! # Two-phase workflow
//!
//! 1. **Plan** ([`plan_cut`]) reads history, resolves the version, produces
//!    notes and computes the merged changelog in memory. Nothing is written,
//!    so the CLI can show a preview and ask for confirmation.
//! 2. **Execute** ([`CutPlan::execute`]) writes the changelog atomically and
//!    optionally publishes the release.
//!
//! [`cut_release`] runs both back to back. Progress is reported through a
//! [`CutEvent`] callback.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::changelog::merge::{
    MergedEntry, build_changelog_from_notes, move_unreleased_content, prepend_fragment,
};
use crate::changelog::{ChangelogError, read_or_empty, write_atomic};
use crate::git::History;
use crate::notes::{NotesError, NotesGenerator, ReleaseNotes, synthesize_notes};
use crate::publish::{PublishError, ReleasePublisher};
use crate::release::{PlanOptions, Release, ReleaseError, plan_release};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors from cutting a release.
#[derive(Error, Debug)]
pub enum CutError {
    /// Planning failed, or there is nothing to release.
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// Only changes that do not warrant a version bump since the last tag.
    #[error("nothing to release: no changes since {version} warrant a new version")]
    VersionUnchanged {
        /// The current (and resolved) version.
        version: String,
    },

    /// The notes generator failed.
    #[error(transparent)]
    Notes(#[from] NotesError),

    /// Reading or writing the changelog failed.
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// Publishing to the forge failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl CutError {
    /// Whether the cut stopped because there was nothing to release.
    pub const fn is_nothing_to_release(&self) -> bool {
        match self {
            Self::Release(e) => e.is_nothing_to_release(),
            Self::VersionUnchanged { .. } => true,
            _ => false,
        }
    }
}

/// Result alias for cut operations.
pub type CutResult<T> = Result<T, CutError>;

// ──────────────────────────────────────────────
// Options and events
// ──────────────────────────────────────────────

/// Options for a cut.
#[derive(Debug, Clone, Copy, Default)]
pub struct CutOptions {
    /// Compute everything but write nothing and publish nothing.
    pub dry_run: bool,
    /// Publish as a draft release.
    pub draft: bool,
    /// Skip diff statistics and contributors.
    pub no_stats: bool,
}

/// Phases of a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CutPhase {
    /// Read history and resolve the version.
    Plan,
    /// Produce release notes.
    Notes,
    /// Write the changelog.
    Changelog,
    /// Create the release on the forge.
    Publish,
}

impl std::fmt::Display for CutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Notes => write!(f, "notes"),
            Self::Changelog => write!(f, "changelog"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

/// Progress events emitted during a cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutEvent {
    /// A phase has started.
    Started(CutPhase),
    /// A phase has finished.
    Completed(CutPhase),
    /// A phase was skipped, with the reason.
    Skipped(CutPhase, String),
}

// ──────────────────────────────────────────────
// Plan
// ──────────────────────────────────────────────

/// Everything a cut will do, computed but not yet applied.
#[derive(Debug, Clone)]
pub struct CutPlan {
    /// The classified release.
    pub release: Release,
    /// Notes for the release.
    pub notes: ReleaseNotes,
    /// The changelog entry and the full updated document.
    pub entry: MergedEntry,
    /// Whether staged Unreleased content went into the entry.
    pub included_staged: bool,
    /// Changelog that will be written.
    pub changelog_path: Utf8PathBuf,
}

/// Plan a cut without touching the filesystem.
///
/// Fails with a [`CutError::is_nothing_to_release`] error when there are no
/// new commits, or when none of them warrants a version bump (the resolved
/// version would overwrite the previous release's entry).
#[instrument(skip(history, generator, on_event))]
pub fn plan_cut(
    history: &dyn History,
    generator: Option<&dyn NotesGenerator>,
    changelog_path: &Utf8Path,
    options: CutOptions,
    on_event: &mut dyn FnMut(CutEvent),
) -> CutResult<CutPlan> {
    on_event(CutEvent::Started(CutPhase::Plan));
    let release = plan_release(
        history,
        PlanOptions {
            no_stats: options.no_stats,
        },
    )?;
    if release.is_unchanged() {
        return Err(CutError::VersionUnchanged {
            version: release.version,
        });
    }
    on_event(CutEvent::Completed(CutPhase::Plan));

    on_event(CutEvent::Started(CutPhase::Notes));
    let notes = synthesize_notes(&release, generator)?;
    on_event(CutEvent::Completed(CutPhase::Notes));

    let content = read_or_empty(changelog_path)?;
    let fragment = build_changelog_from_notes(history, &release, &notes);
    let (entry, included_staged) = match move_unreleased_content(&content, &fragment)? {
        Some(entry) => (entry, true),
        None => {
            let document = prepend_fragment(&content, &fragment)?;
            (MergedEntry { fragment, document }, false)
        }
    };
    debug!(included_staged, "changelog entry prepared");

    Ok(CutPlan {
        release,
        notes,
        entry,
        included_staged,
        changelog_path: changelog_path.to_path_buf(),
    })
}

// ──────────────────────────────────────────────
// Execute
// ──────────────────────────────────────────────

/// What a cut did.
#[derive(Debug, Clone, Serialize)]
pub struct CutOutcome {
    /// The released version tag.
    pub version: String,
    /// The previous version tag.
    pub previous_version: String,
    /// Bump label.
    pub version_bump: String,
    /// Changelog path.
    pub changelog_path: Utf8PathBuf,
    /// The changelog entry.
    pub fragment: String,
    /// Whether staged Unreleased content went into the entry.
    pub included_staged: bool,
    /// Whether the changelog was written.
    pub written: bool,
    /// Whether a release was created on the forge.
    pub published: bool,
    /// Release URL reported by the forge.
    pub release_url: Option<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// The notes used.
    pub notes: ReleaseNotes,
}

impl CutPlan {
    /// Apply the plan: write the changelog, then publish when a publisher
    /// is given. A publish failure leaves the written changelog in place.
    #[instrument(skip_all, fields(version = %self.release.version, dry_run = options.dry_run))]
    pub fn execute(
        self,
        publisher: Option<&dyn ReleasePublisher>,
        options: CutOptions,
        on_event: &mut dyn FnMut(CutEvent),
    ) -> CutResult<CutOutcome> {
        let mut outcome = CutOutcome {
            version: self.release.version.clone(),
            previous_version: self.release.previous_version.clone(),
            version_bump: self.release.version_bump.to_string(),
            changelog_path: self.changelog_path.clone(),
            fragment: self.entry.fragment.clone(),
            included_staged: self.included_staged,
            written: false,
            published: false,
            release_url: None,
            dry_run: options.dry_run,
            notes: self.notes.clone(),
        };

        if options.dry_run {
            on_event(CutEvent::Skipped(CutPhase::Changelog, "dry run".into()));
        } else {
            on_event(CutEvent::Started(CutPhase::Changelog));
            write_atomic(&self.changelog_path, &self.entry.document)?;
            outcome.written = true;
            on_event(CutEvent::Completed(CutPhase::Changelog));
        }

        match publisher {
            None => {}
            Some(_) if options.dry_run => {
                on_event(CutEvent::Skipped(CutPhase::Publish, "dry run".into()));
            }
            Some(publisher) => {
                on_event(CutEvent::Started(CutPhase::Publish));
                outcome.release_url =
                    publisher.create_release(&self.release, &self.notes, options.draft)?;
                outcome.published = true;
                on_event(CutEvent::Completed(CutPhase::Publish));
            }
        }

        if outcome.written {
            info!(path = %self.changelog_path, "release cut");
        } else {
            warn!("dry run, nothing written");
        }
        Ok(outcome)
    }
}

/// Plan and execute a cut in one go.
pub fn cut_release(
    history: &dyn History,
    generator: Option<&dyn NotesGenerator>,
    publisher: Option<&dyn ReleasePublisher>,
    changelog_path: &Utf8Path,
    options: CutOptions,
    on_event: &mut dyn FnMut(CutEvent),
) -> CutResult<CutOutcome> {
    let plan = plan_cut(history, generator, changelog_path, options, on_event)?;
    plan.execute(publisher, options, on_event)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::changelog::merge::{new_changelog, stage_entry_content};
    use crate::changelog::validate::validate_content;
    use crate::notes::NotesResult;
    use crate::publish::PublishResult;
    use crate::release::tests::FakeHistory;

    fn temp_changelog(content: Option<&str>) -> (tempfile::TempDir, Utf8PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("CHANGELOG.md")).unwrap();
        if let Some(content) = content {
            std::fs::write(&path, content).unwrap();
        }
        (tmp, path)
    }

    fn history() -> FakeHistory {
        FakeHistory {
            tag_dates: vec![("v1.1.0".into(), "2024-03-01".into())],
            repo: crate::git::parse_remote("git@github.com:acme/widgets.git"),
            ..FakeHistory::new(Some("v1.0.0"), &["feat: add X (#12)", "fix: correct Y"])
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        calls: RefCell<Vec<(String, bool)>>,
    }

    impl ReleasePublisher for RecordingPublisher {
        fn create_release(
            &self,
            release: &Release,
            _notes: &ReleaseNotes,
            draft: bool,
        ) -> PublishResult<Option<String>> {
            self.calls
                .borrow_mut()
                .push((release.version.clone(), draft));
            Ok(Some(format!("https://example.com/releases/{}", release.version)))
        }
    }

    struct Refusing;

    impl NotesGenerator for Refusing {
        fn generate(&self, _release: &Release) -> NotesResult<ReleaseNotes> {
            Err(NotesError::InvalidResponse("not JSON".into()))
        }
    }

    #[test]
    fn cut_writes_changelog_and_publishes() {
        let (_tmp, path) = temp_changelog(Some(&new_changelog()));
        let publisher = RecordingPublisher::default();
        let mut events = Vec::new();
        let options = CutOptions {
            draft: true,
            ..CutOptions::default()
        };

        let outcome = cut_release(
            &history(),
            None,
            Some(&publisher),
            &path,
            options,
            &mut |e| events.push(e),
        )
        .unwrap();

        assert_eq!(outcome.version, "v1.1.0");
        assert!(outcome.written && outcome.published);
        assert_eq!(
            outcome.release_url.as_deref(),
            Some("https://example.com/releases/v1.1.0")
        );
        assert_eq!(*publisher.calls.borrow(), vec![("v1.1.0".to_string(), true)]);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## [Unreleased]\n\n## [v1.1.0] - 2024-03-01\n"));
        assert!(content.contains(
            "[v1.1.0]: https://github.com/acme/widgets/compare/v1.0.0...v1.1.0"
        ));
        assert!(content.contains("- add X (#12)"));
        assert!(validate_content(&content, 30).is_empty());

        assert_eq!(
            events,
            [
                CutEvent::Started(CutPhase::Plan),
                CutEvent::Completed(CutPhase::Plan),
                CutEvent::Started(CutPhase::Notes),
                CutEvent::Completed(CutPhase::Notes),
                CutEvent::Started(CutPhase::Changelog),
                CutEvent::Completed(CutPhase::Changelog),
                CutEvent::Started(CutPhase::Publish),
                CutEvent::Completed(CutPhase::Publish),
            ]
        );
    }

    #[test]
    fn dry_run_touches_nothing() {
        let staged = stage_entry_content(&new_changelog(), None, "Hand-written note");
        let (_tmp, path) = temp_changelog(Some(&staged));
        let publisher = RecordingPublisher::default();
        let options = CutOptions {
            dry_run: true,
            ..CutOptions::default()
        };

        let outcome =
            cut_release(&history(), None, Some(&publisher), &path, options, &mut |_| {}).unwrap();

        assert!(!outcome.written && !outcome.published);
        assert!(outcome.included_staged);
        assert!(outcome.fragment.contains("- Hand-written note"));
        assert!(publisher.calls.borrow().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), staged);
    }

    #[test]
    fn rerunning_a_cut_replaces_the_entry() {
        let (_tmp, path) = temp_changelog(None);
        for _ in 0..2 {
            cut_release(&history(), None, None, &path, CutOptions::default(), &mut |_| {})
                .unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("## [v1.1.0]").count(), 1);
        assert_eq!(content.matches("[v1.1.0]:").count(), 1);
    }

    #[test]
    fn nothing_to_release_is_reported_distinctly() {
        let (_tmp, path) = temp_changelog(None);
        let mut history = FakeHistory::new(Some("v1.0.0"), &[]);
        history.total_commits = Some(5);
        let err = cut_release(&history, None, None, &path, CutOptions::default(), &mut |_| {})
            .unwrap_err();
        assert!(err.is_nothing_to_release());
        assert!(!path.exists());
    }

    #[test]
    fn unchanged_version_is_not_cut() {
        let (_tmp, path) = temp_changelog(None);
        let history = FakeHistory::new(Some("v1.0.0"), &["docs: typo", "chore: deps"]);
        let err = cut_release(&history, None, None, &path, CutOptions::default(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, CutError::VersionUnchanged { ref version } if version == "v1.0.0"));
        assert!(err.is_nothing_to_release());
    }

    #[test]
    fn generator_failure_leaves_changelog_alone() {
        let (_tmp, path) = temp_changelog(Some(&new_changelog()));
        let err = cut_release(
            &history(),
            Some(&Refusing),
            None,
            &path,
            CutOptions::default(),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, CutError::Notes(_)));
        assert!(!err.is_nothing_to_release());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), new_changelog());
    }

    #[test]
    fn phase_display() {
        assert_eq!(CutPhase::Plan.to_string(), "plan");
        assert_eq!(CutPhase::Publish.to_string(), "publish");
        assert_eq!(serde_json::to_string(&CutPhase::Changelog).unwrap(), "\"changelog\"");
    }
}
