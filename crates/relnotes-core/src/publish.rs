//! Publishing a release to the hosting forge.
//!
//! The release engine only produces notes; [`ReleasePublisher`] is the seam
//! where they leave the machine. [`GhPublisher`] creates a GitHub release
//! through the `gh` CLI, so the user's existing `gh auth` session is used.

use std::io::Write;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::notes::ReleaseNotes;
use crate::release::Release;

/// Errors from publishing.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The `gh` executable is not on `PATH`.
    #[error("the GitHub CLI (gh) was not found on PATH")]
    GhNotFound,

    /// Failed to run `gh` or to stage the notes file.
    #[error("failed to run gh: {0}")]
    Exec(#[from] std::io::Error),

    /// `gh release create` reported failure.
    #[error("gh release create failed: {stderr}")]
    Failed {
        /// Captured stderr.
        stderr: String,
    },
}

/// Result alias for publishing.
pub type PublishResult<T> = Result<T, PublishError>;

/// Something that can publish a release with its notes.
pub trait ReleasePublisher {
    /// Create the release for `release.version`. Returns the release URL when
    /// the host reports one.
    fn create_release(
        &self,
        release: &Release,
        notes: &ReleaseNotes,
        draft: bool,
    ) -> PublishResult<Option<String>>;
}

/// Title shown on the forge: the notes title, or `Version <tag>`.
pub fn release_title(release: &Release, notes: &ReleaseNotes) -> String {
    let title = notes.title.trim();
    if title.is_empty() {
        format!("Version {}", release.version)
    } else {
        title.to_string()
    }
}

/// Release body: the changelog rendering of the notes plus their links.
pub fn render_release_body(notes: &ReleaseNotes) -> String {
    let mut body = notes.render_body();
    if !notes.links.is_empty() {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str("### 🔗 Links");
        for (label, url) in &notes.links {
            body.push_str(&format!("\n- [{label}]({url})"));
        }
        body.push('\n');
    }
    body
}

/// [`ReleasePublisher`] backed by `gh release create`.
#[derive(Debug, Clone)]
pub struct GhPublisher {
    root: Utf8PathBuf,
}

impl GhPublisher {
    /// Publish from the repository at `root`.
    pub fn new(root: impl AsRef<Utf8Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Whether `gh` is installed.
    pub fn is_available() -> bool {
        which::which("gh").is_ok()
    }
}

impl ReleasePublisher for GhPublisher {
    #[instrument(skip_all, fields(tag = %release.version, draft = draft))]
    fn create_release(
        &self,
        release: &Release,
        notes: &ReleaseNotes,
        draft: bool,
    ) -> PublishResult<Option<String>> {
        let gh = which::which("gh").map_err(|_| PublishError::GhNotFound)?;

        let mut notes_file = tempfile::NamedTempFile::new()?;
        notes_file.write_all(render_release_body(notes).as_bytes())?;
        notes_file.flush()?;

        let title = release_title(release, notes);
        let mut cmd = Command::new(gh);
        cmd.args(["release", "create", &release.version, "--title", &title])
            .arg("--notes-file")
            .arg(notes_file.path())
            .current_dir(self.root.as_std_path());
        if draft {
            cmd.arg("--draft");
        }

        debug!(%title, "creating release");
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(PublishError::Failed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(%url, "release published");
        Ok((!url.is_empty()).then_some(url))
    }
}
