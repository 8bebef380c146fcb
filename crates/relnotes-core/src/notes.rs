//! Release notes synthesis.
//!
//! A [`Release`] becomes [`ReleaseNotes`] either through an external
//! [`NotesGenerator`] (typically an AI model behind a shell command) or
//! through the deterministic [`fallback_notes`]. Generator errors propagate
//! unchanged; the fallback cannot fail.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::prompt::{Locale, PromptContext, PromptKind, get_prompt_template, render_template};
use crate::release::Release;
use crate::version::BumpLevel;
use crate::version::conventional::ReleaseItem;

/// Errors from notes synthesis.
#[derive(Error, Debug)]
pub enum NotesError {
    /// Failed to start or talk to the generator process.
    #[error("failed to run notes generator: {0}")]
    Spawn(#[from] std::io::Error),

    /// The generator ran but reported failure.
    #[error("notes generator failed: {message}")]
    Generator {
        /// Exit status and captured stderr.
        message: String,
    },

    /// The generator did not finish within the configured timeout.
    #[error("notes generator timed out after {after:?}")]
    TimedOut {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The generator output did not contain valid notes JSON.
    #[error("notes generator returned invalid output: {0}")]
    InvalidResponse(String),

    /// Rendering the prompt failed.
    #[error("failed to render prompt: {0}")]
    Template(#[from] serde_json::Error),
}

/// Result alias for notes operations.
pub type NotesResult<T> = Result<T, NotesError>;

/// A titled group of bullet items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesSection {
    /// Heading text, often emoji-prefixed.
    pub title: String,
    /// One entry per bullet.
    #[serde(default)]
    pub items: Vec<String>,
}

/// Human-readable notes for one release.
///
/// `sections` is the preferred grouping and wins over the flat `highlights`
/// list when both are set. `changelog` carries a pre-rendered markdown body
/// and is only used when neither of the other two is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNotes {
    /// Release title.
    #[serde(default)]
    pub title: String,
    /// One-paragraph summary.
    #[serde(default)]
    pub summary: String,
    /// Flat highlight list (legacy format).
    #[serde(default)]
    pub highlights: Vec<String>,
    /// Semantic sections.
    #[serde(default)]
    pub sections: Vec<NotesSection>,
    /// Breaking changes, rendered in their own section.
    #[serde(default)]
    pub breaking_changes: Vec<String>,
    /// Extra links by label, e.g. `"Contributors"`.
    #[serde(default)]
    pub links: BTreeMap<String, String>,
    /// Bump recommended by the generator.
    #[serde(default)]
    pub recommended: Option<BumpLevel>,
    /// Pre-rendered markdown body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub changelog: String,
}

impl ReleaseNotes {
    /// Render the markdown body shared by changelog entries and published
    /// releases: summary, then sections (or highlights, or the pre-rendered
    /// body), then breaking changes.
    pub fn render_body(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();

        let summary = self.summary.trim();
        if !summary.is_empty() {
            blocks.push(summary.to_string());
        }

        if !self.sections.is_empty() {
            blocks.extend(
                self.sections
                    .iter()
                    .filter(|s| !s.items.is_empty())
                    .map(|s| heading_with_bullets(&s.title, &s.items)),
            );
        } else if !self.highlights.is_empty() {
            blocks.push(heading_with_bullets("✨ Highlights", &self.highlights));
        } else if !self.changelog.trim().is_empty() {
            blocks.push(self.changelog.trim().to_string());
        }

        if !self.breaking_changes.is_empty() {
            blocks.push(heading_with_bullets(
                BREAKING_HEADING,
                &self.breaking_changes,
            ));
        }

        if blocks.is_empty() {
            return String::new();
        }
        let mut body = blocks.join("\n\n");
        body.push('\n');
        body
    }
}

const BREAKING_HEADING: &str = "⚠️ Breaking Changes";

fn heading_with_bullets(title: &str, items: &[String]) -> String {
    let mut block = format!("### {}", title.trim());
    for item in items {
        block.push_str("\n- ");
        block.push_str(item.trim());
    }
    block
}

/// Something that can write release notes for a [`Release`].
pub trait NotesGenerator {
    /// Produce notes for `release`. Errors are surfaced to the caller as-is.
    fn generate(&self, release: &Release) -> NotesResult<ReleaseNotes>;
}

/// Produce notes through `generator` when one is configured, otherwise
/// through [`fallback_notes`].
#[instrument(skip_all, fields(version = %release.version))]
pub fn synthesize_notes(
    release: &Release,
    generator: Option<&dyn NotesGenerator>,
) -> NotesResult<ReleaseNotes> {
    match generator {
        Some(generator) => {
            debug!("delegating to notes generator");
            generator.generate(release)
        }
        None => {
            debug!("no generator configured, using fallback notes");
            Ok(fallback_notes(release))
        }
    }
}

/// Deterministic notes built from the classified buckets alone.
pub fn fallback_notes(release: &Release) -> ReleaseNotes {
    let summary = format!(
        "This release includes {}, {} and {}.",
        counted(release.features.len(), "new feature", "new features"),
        counted(release.bug_fixes.len(), "bug fix", "bug fixes"),
        counted(release.breaking.len(), "breaking change", "breaking changes"),
    );

    let buckets = [
        (BREAKING_HEADING, &release.breaking),
        ("✨ Features", &release.features),
        ("🐛 Bug Fixes", &release.bug_fixes),
        ("⚡ Improvements", &release.improvements),
        ("📝 Documentation", &release.documentation),
    ];
    let changelog = buckets
        .iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(heading, items)| {
            let bullets: Vec<String> = items.iter().map(fallback_bullet).collect();
            heading_with_bullets(heading, &bullets)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    ReleaseNotes {
        title: format!("Version {}", release.version),
        summary,
        recommended: Some(release.version_bump),
        changelog,
        ..ReleaseNotes::default()
    }
}

fn counted(n: usize, one: &str, many: &str) -> String {
    match n {
        0 => format!("no {many}"),
        1 => format!("1 {one}"),
        _ => format!("{n} {many}"),
    }
}

fn fallback_bullet(item: &ReleaseItem) -> String {
    let mut line = String::new();
    if let Some(ref scope) = item.scope {
        line.push_str(&format!("**{scope}**: "));
    }
    line.push_str(&item.description);
    if let Some(ref pr) = item.pr_number {
        line.push_str(&format!(" (#{pr})"));
    }
    line
}

/// Default time allowed for an external generator.
pub const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(120);

/// How often a running generator is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// [`NotesGenerator`] that pipes a rendered prompt into a shell command and
/// reads [`ReleaseNotes`] JSON back from its stdout.
///
/// The command runs under `sh -c`, so anything from `llm -m model` to a
/// local script works. Output may wrap the JSON in prose or a fenced code
/// block; the outermost `{ ... }` is parsed.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
    project: String,
    locale: Locale,
    timeout: Duration,
    cwd: Option<Utf8PathBuf>,
}

impl CommandGenerator {
    /// Generator running `command` for the named project.
    pub fn new(command: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            project: project.into(),
            locale: Locale::default(),
            timeout: DEFAULT_GENERATOR_TIMEOUT,
            cwd: None,
        }
    }

    /// Language of the prompt (and so of the notes).
    pub const fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Kill the command and fail once this much time has passed.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the command from this directory.
    pub fn with_cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Full prompt text sent on stdin: system instructions, then the request.
    pub fn prompt(&self, release: &Release) -> NotesResult<String> {
        let context = PromptContext::from_release(&self.project, release);
        let system = render_template(
            get_prompt_template(self.locale, PromptKind::ReleaseNotesSystem),
            &context,
        )?;
        let user = render_template(
            get_prompt_template(self.locale, PromptKind::ReleaseNotesUser),
            &context,
        )?;
        Ok(format!("{system}\n\n{user}\n"))
    }

    fn run(&self, input: String) -> NotesResult<String> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", &self.command])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd.as_std_path());
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Its own group, so a timeout reaches every process of a pipeline.
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;

        // Pipes are fed and drained on their own threads while the loop
        // below polls for exit.
        let stdin = child.stdin.take();
        thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // The command may legitimately exit without reading stdin.
                let _ = stdin.write_all(input.as_bytes());
            }
        });
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let start = Instant::now();
        let deadline = start + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(timeout = ?self.timeout, "notes generator timed out, killing it");
                kill_process_group(&mut child);
                return Err(NotesError::TimedOut {
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Output ends when every process holding the pipes has exited, which
        // can be later than the shell itself.
        let (Some(stdout), Some(stderr)) = (
            collect(&stdout_rx, deadline),
            collect(&stderr_rx, deadline),
        ) else {
            warn!(timeout = ?self.timeout, "notes generator output still open, killing it");
            kill_process_group(&mut child);
            return Err(NotesError::TimedOut {
                after: self.timeout,
            });
        };
        debug!(%status, elapsed = ?start.elapsed(), "notes generator finished");

        if !status.success() {
            return Err(NotesError::Generator {
                message: format!("{status}: {}", stderr.trim()),
            });
        }
        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Wait for a drained pipe until `deadline`.
fn collect(pipe: &mpsc::Receiver<String>, deadline: Instant) -> Option<String> {
    pipe.recv_timeout(deadline.saturating_duration_since(Instant::now())).ok()
}

/// Kill the generator and, on unix, everything else in its process group.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-s", "KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl NotesGenerator for CommandGenerator {
    #[instrument(skip_all, fields(command = %self.command, locale = ?self.locale))]
    fn generate(&self, release: &Release) -> NotesResult<ReleaseNotes> {
        let prompt = self.prompt(release)?;
        let output = self.run(prompt)?;
        let notes = parse_notes_response(&output)?;
        info!(
            sections = notes.sections.len(),
            highlights = notes.highlights.len(),
            "generator produced notes"
        );
        Ok(notes)
    }
}

/// Extract [`ReleaseNotes`] from generator output, tolerating surrounding
/// prose and code fences.
pub fn parse_notes_response(output: &str) -> NotesResult<ReleaseNotes> {
    let (Some(start), Some(end)) = (output.find('{'), output.rfind('}')) else {
        return Err(NotesError::InvalidResponse(
            "no JSON object in generator output".into(),
        ));
    };
    if end < start {
        return Err(NotesError::InvalidResponse(
            "no JSON object in generator output".into(),
        ));
    }
    serde_json::from_str(&output[start..=end])
        .map_err(|e| NotesError::InvalidResponse(e.to_string()))
}
