//! Git history access for release workflows.
//!
//! The engine only talks to the [`History`] trait. [`GitCli`] implements it by
//! shelling out to `git`, so the user's SSH keys, config and hooks apply.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::version::version_in_tag;

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "log").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,

    /// The tag does not exist or has no date.
    #[error("no date recorded for tag {0}")]
    NoTagDate(String),
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// A commit as read from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash.
    pub hash: String,
    /// Full commit message (subject and body).
    pub message: String,
}

impl Commit {
    /// Build a commit with an empty hash, mostly useful in tests.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            hash: String::new(),
            message: message.into(),
        }
    }
}

/// The kind of forge hosting the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// github.com or GitHub Enterprise.
    GitHub,
    /// gitlab.com or a self-hosted GitLab.
    GitLab,
    /// Gitea / Forgejo / Codeberg.
    Gitea,
    /// Any other host.
    Unknown,
}

impl HostKind {
    fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host.contains("github") {
            Self::GitHub
        } else if host.contains("gitlab") {
            Self::GitLab
        } else if host.contains("gitea") || host.contains("codeberg") || host.contains("forgejo")
        {
            Self::Gitea
        } else {
            Self::Unknown
        }
    }
}

/// Repository coordinates derived from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Forge kind.
    pub kind: HostKind,
    /// Web base URL of the host, e.g. `https://github.com`.
    pub host_url: String,
    /// Repository owner or group.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepoInfo {
    /// Web URL of the repository.
    pub fn web_url(&self) -> String {
        format!("{}/{}/{}", self.host_url, self.owner, self.repo)
    }

    /// Comparison URL between two tags.
    pub fn compare_url(&self, from: &str, to: &str) -> String {
        format!("{}/compare/{from}...{to}", self.web_url())
    }

    /// URL of a single tag's release page.
    pub fn tag_url(&self, tag: &str) -> String {
        format!("{}/releases/tag/{tag}", self.web_url())
    }
}

/// Aggregate diff statistics between a ref and `HEAD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Number of commits in the range.
    pub commit_count: usize,
    /// Number of files changed.
    pub files_changed: usize,
    /// Total lines inserted.
    pub insertions: usize,
    /// Total lines deleted.
    pub deletions: usize,
}

/// Read access to repository history.
///
/// This is the boundary to version control: everything the release engine
/// knows about commits, tags and the remote comes through here.
pub trait History {
    /// The most recent version tag, if any.
    fn last_tag(&self) -> GitResult<Option<String>>;

    /// Total number of commits reachable from `HEAD` (0 for an empty repository).
    fn commit_count(&self) -> GitResult<usize>;

    /// Commits since `tag` (or all commits when `None`), newest first.
    fn commits_since(&self, tag: Option<&str>) -> GitResult<Vec<Commit>>;

    /// Creation date of a tag as `YYYY-MM-DD`.
    fn tag_date(&self, tag: &str) -> GitResult<String>;

    /// Repository coordinates, if a usable remote is configured.
    fn repo_info(&self) -> GitResult<Option<RepoInfo>>;

    /// Diff statistics since `tag` (or the whole history when `None`).
    fn diff_stats(&self, _tag: Option<&str>) -> GitResult<DiffStats> {
        Ok(DiffStats::default())
    }

    /// Contributors since `tag` with their commit counts, most active first.
    fn contributors(&self, _tag: Option<&str>, _limit: usize) -> GitResult<Vec<(String, usize)>> {
        Ok(Vec::new())
    }
}

/// [`History`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: Utf8PathBuf,
    remote: String,
}

impl GitCli {
    /// Read history from the repository containing `root`, using the `origin` remote.
    pub fn new(root: impl AsRef<Utf8Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            remote: "origin".into(),
        }
    }

    /// Use a different remote for repository coordinates.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Check whether the root is inside a git work tree.
    #[instrument(skip(self), fields(root = %self.root))]
    pub fn is_inside_repo(&self) -> GitResult<bool> {
        match self.git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(output) => Ok(output.trim() == "true"),
            Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get the current branch name. `None` on a detached `HEAD`.
    #[instrument(skip(self))]
    pub fn current_branch(&self) -> GitResult<Option<String>> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        if branch == "HEAD" {
            debug!("detached HEAD");
            Ok(None)
        } else {
            debug!(%branch, "current branch");
            Ok(Some(branch))
        }
    }

    /// Get the URL of the configured remote.
    #[instrument(skip(self), fields(remote = %self.remote))]
    pub fn remote_url(&self) -> GitResult<Option<String>> {
        match self.git(&["remote", "get-url", &self.remote]) {
            Ok(url) => {
                let url = url.trim().to_string();
                debug!(%url, "remote URL");
                Ok(Some(url))
            }
            Err(GitError::Command { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn git(&self, args: &[&str]) -> GitResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root.as_std_path())
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo);
            }

            Err(GitError::Command {
                command: args.first().unwrap_or(&"").to_string(),
                stderr,
            })
        }
    }
}

/// Separates fields within one `git log` record.
const FIELD_SEP: char = '\u{1f}';
/// Terminates one `git log` record.
const RECORD_SEP: char = '\u{1e}';

impl History for GitCli {
    #[instrument(skip(self))]
    fn last_tag(&self) -> GitResult<Option<String>> {
        // An unborn HEAD has no reachable tags.
        let output = match self.git(&["tag", "--merged", "HEAD"]) {
            Ok(output) => output,
            Err(GitError::Command { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let tag = latest_version_tag(&output);
        debug!(?tag, "latest version tag reachable from HEAD");
        Ok(tag)
    }

    #[instrument(skip(self))]
    fn commit_count(&self) -> GitResult<usize> {
        // An unborn HEAD makes rev-list fail; that is an empty repository.
        match self.git(&["rev-list", "--count", "HEAD"]) {
            Ok(output) => Ok(output.trim().parse().unwrap_or(0)),
            Err(GitError::Command { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    fn commits_since(&self, tag: Option<&str>) -> GitResult<Vec<Commit>> {
        let range = tag.map_or_else(|| "HEAD".to_string(), |t| format!("{t}..HEAD"));
        let output = self.git(&["log", &range, "--format=%H%x1f%B%x1e"])?;
        let commits = parse_log_records(&output);
        debug!(count = commits.len(), "commits since tag");
        Ok(commits)
    }

    #[instrument(skip(self))]
    fn tag_date(&self, tag: &str) -> GitResult<String> {
        let reference = format!("refs/tags/{tag}");
        let output = self.git(&[
            "for-each-ref",
            "--format=%(creatordate:short)",
            &reference,
        ])?;
        let date = output.trim();
        if date.is_empty() {
            return Err(GitError::NoTagDate(tag.to_string()));
        }
        Ok(date.to_string())
    }

    #[instrument(skip(self))]
    fn repo_info(&self) -> GitResult<Option<RepoInfo>> {
        Ok(self.remote_url()?.as_deref().and_then(parse_remote))
    }

    #[instrument(skip(self))]
    fn diff_stats(&self, tag: Option<&str>) -> GitResult<DiffStats> {
        let range = tag.map_or_else(|| "HEAD".to_string(), |t| format!("{t}..HEAD"));
        let count = self.git(&["rev-list", "--count", &range])?;
        let shortstat = match tag {
            Some(t) => self.git(&["diff", "--shortstat", &format!("{t}..HEAD")])?,
            None => String::new(),
        };

        let mut stats = parse_shortstat(&shortstat);
        stats.commit_count = count.trim().parse().unwrap_or(0);
        Ok(stats)
    }

    #[instrument(skip(self))]
    fn contributors(&self, tag: Option<&str>, limit: usize) -> GitResult<Vec<(String, usize)>> {
        let range = tag.map_or_else(|| "HEAD".to_string(), |t| format!("{t}..HEAD"));
        let output = self.git(&["shortlog", "-sn", "--no-merges", &range])?;
        let contributors = output
            .lines()
            .filter_map(|line| {
                let (count, name) = line.trim().split_once(char::is_whitespace)?;
                Some((name.trim().to_string(), count.parse().ok()?))
            })
            .take(limit)
            .collect();
        Ok(contributors)
    }
}

/// Pick the tag carrying the highest version from `git tag` output.
///
/// Tags without a `major.minor.patch` triple are ignored. Among tags naming
/// the same version, the last one listed wins.
fn latest_version_tag(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|tag| version_in_tag(tag).map(|version| (version, tag)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.to_string())
}

/// Split `git log --format=%H%x1f%B%x1e` output into commits.
fn parse_log_records(output: &str) -> Vec<Commit> {
    output
        .split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_start_matches('\n');
            let (hash, message) = record.split_once(FIELD_SEP)?;
            let hash = hash.trim();
            if hash.is_empty() {
                return None;
            }
            Some(Commit {
                hash: hash.to_string(),
                message: message.trim().to_string(),
            })
        })
        .collect()
}

/// Parse `git diff --shortstat` output such as
/// ` 3 files changed, 10 insertions(+), 2 deletions(-)`.
fn parse_shortstat(output: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    for part in output.trim().split(',') {
        let part = part.trim();
        let Some((number, label)) = part.split_once(' ') else {
            continue;
        };
        let Ok(n) = number.parse::<usize>() else {
            continue;
        };
        if label.starts_with("file") {
            stats.files_changed = n;
        } else if label.starts_with("insertion") {
            stats.insertions = n;
        } else if label.starts_with("deletion") {
            stats.deletions = n;
        }
    }
    stats
}

/// Parse host, owner and repo from a git remote URL.
///
/// Handles both HTTPS and SSH formats:
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
/// - `ssh://git@gitlab.example.com/group/repo.git`
///
/// Returns `None` if the URL cannot be parsed.
pub fn parse_remote(url: &str) -> Option<RepoInfo> {
    let url = url.trim();
    let (host, path) = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')?
    } else {
        let after_scheme = url.split_once("://")?.1;
        let after_user = after_scheme
            .split_once('@')
            .map_or(after_scheme, |(_, rest)| rest);
        after_user.split_once('/')?
    };

    // Drop an explicit port from ssh:// URLs; web URLs never use it.
    let host = host.split(':').next().unwrap_or(host);
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.trim_matches('/').rsplit_once('/')?;

    if host.is_empty() || owner.is_empty() || repo.is_empty() {
        return None;
    }

    Some(RepoInfo {
        kind: HostKind::from_host(host),
        host_url: format!("https://{host}"),
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> GitCli {
        let cwd = std::env::current_dir().unwrap();
        GitCli::new(Utf8PathBuf::try_from(cwd).unwrap())
    }

    #[test]
    fn is_inside_repo_returns_bool() {
        assert!(here().is_inside_repo().is_ok());
    }

    #[test]
    fn history_queries_work_in_repo() {
        let git = here();
        if git.is_inside_repo().unwrap_or(false) {
            assert!(git.last_tag().is_ok());
            assert!(git.commit_count().is_ok());
            assert!(git.repo_info().is_ok());
        }
    }

    #[test]
    fn empty_directory_has_no_commits() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let git = GitCli::new(&root);
        // Outside any repository git reports an error; either way nothing is counted.
        assert!(git.commit_count().map_or(true, |n| n == 0));
    }

    /// An empty repository on `main`, or `None` when git is not installed.
    fn scratch_repo() -> Option<(tempfile::TempDir, GitCli)> {
        which::which("git").ok()?;
        let tmp = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let git = GitCli::new(&root);
        git.git(&["init", "-q", "-b", "main"]).unwrap();
        Some((tmp, git))
    }

    fn run(git: &GitCli, args: &[&str]) {
        let mut full = vec![
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ];
        full.extend_from_slice(args);
        git.git(&full).unwrap();
    }

    fn commit(git: &GitCli, message: &str) {
        run(git, &["commit", "-q", "--allow-empty", "-m", message]);
    }

    #[test]
    fn latest_version_tag_compares_versions() {
        let output = "v1.2.0\nnightly\n1.10.0\nv1.9.3\n";
        assert_eq!(latest_version_tag(output).as_deref(), Some("1.10.0"));
        assert_eq!(latest_version_tag("nightly\n"), None);
        assert_eq!(latest_version_tag(""), None);
    }

    #[test]
    fn unprefixed_tag_starts_the_next_release() {
        let Some((_tmp, git)) = scratch_repo() else {
            return;
        };
        commit(&git, "feat: first");
        run(&git, &["tag", "1.4.0"]);
        commit(&git, "fix: after the tag");

        assert_eq!(git.last_tag().unwrap().as_deref(), Some("1.4.0"));
        assert_eq!(git.commits_since(Some("1.4.0")).unwrap().len(), 1);

        let release = crate::release::plan_release(
            &git,
            crate::release::PlanOptions { no_stats: true },
        )
        .unwrap();
        assert_eq!(release.previous_version, "v1.4.0");
        assert_eq!(release.version, "v1.4.1");
    }

    #[test]
    fn tags_on_other_branches_are_ignored() {
        let Some((_tmp, git)) = scratch_repo() else {
            return;
        };
        commit(&git, "feat: initial");
        run(&git, &["tag", "v1.0.0"]);
        run(&git, &["checkout", "-q", "-b", "next"]);
        commit(&git, "feat!: rewrite");
        run(&git, &["tag", "v2.0.0"]);
        run(&git, &["checkout", "-q", "main"]);
        commit(&git, "fix: hotfix on the 1.x line");

        assert_eq!(git.last_tag().unwrap().as_deref(), Some("v1.0.0"));

        let release = crate::release::plan_release(
            &git,
            crate::release::PlanOptions { no_stats: true },
        )
        .unwrap();
        assert_eq!(release.version, "v1.0.1");
        assert_eq!(release.bug_fixes.len(), 1);
        assert!(release.breaking.is_empty());
    }

    #[test]
    fn unborn_head_has_no_tag() {
        let Some((_tmp, git)) = scratch_repo() else {
            return;
        };
        assert_eq!(git.last_tag().unwrap(), None);
    }

    #[test]
    fn git_error_on_bad_command() {
        assert!(here().git(&["not-a-real-subcommand"]).is_err());
    }

    #[test]
    fn parses_log_records_with_bodies() {
        let output = "abc123\u{1f}feat: one\n\nbody line\n\u{1e}\ndef456\u{1f}fix: two\n\u{1e}\n";
        let commits = parse_log_records(output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].message, "feat: one\n\nbody line");
        assert_eq!(commits[1].message, "fix: two");
    }

    #[test]
    fn parses_shortstat() {
        let stats = parse_shortstat(" 3 files changed, 10 insertions(+), 2 deletions(-)\n");
        assert_eq!(stats.files_changed, 3);
        assert_eq!(stats.insertions, 10);
        assert_eq!(stats.deletions, 2);

        let only_insert = parse_shortstat(" 1 file changed, 1 insertion(+)");
        assert_eq!(only_insert.files_changed, 1);
        assert_eq!(only_insert.deletions, 0);
    }

    #[test]
    fn parse_remote_https() {
        let info = parse_remote("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(info.kind, HostKind::GitHub);
        assert_eq!(info.host_url, "https://github.com");
        assert_eq!(info.owner, "acme");
        assert_eq!(info.repo, "widgets");
    }

    #[test]
    fn parse_remote_ssh() {
        let info = parse_remote("git@gitlab.com:acme/widgets.git").unwrap();
        assert_eq!(info.kind, HostKind::GitLab);
        assert_eq!(info.web_url(), "https://gitlab.com/acme/widgets");
    }

    #[test]
    fn parse_remote_ssh_scheme_with_port_and_group() {
        let info = parse_remote("ssh://git@codeberg.org:2222/org/sub/tool.git").unwrap();
        assert_eq!(info.kind, HostKind::Gitea);
        assert_eq!(info.host_url, "https://codeberg.org");
        assert_eq!(info.owner, "org/sub");
        assert_eq!(info.repo, "tool");
    }

    #[test]
    fn parse_remote_invalid() {
        assert!(parse_remote("not-a-url").is_none());
        assert!(parse_remote("").is_none());
    }

    #[test]
    fn compare_and_tag_urls() {
        let info = parse_remote("https://github.com/acme/widgets").unwrap();
        assert_eq!(
            info.compare_url("v1.0.0", "v1.1.0"),
            "https://github.com/acme/widgets/compare/v1.0.0...v1.1.0"
        );
        assert_eq!(
            info.tag_url("v0.1.0"),
            "https://github.com/acme/widgets/releases/tag/v0.1.0"
        );
    }
}
