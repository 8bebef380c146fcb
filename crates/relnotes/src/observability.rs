//! Logging setup.
//!
//! Stdout carries command output (changelog fragments, JSON), so logs never
//! go there. Each run appends JSON lines to a daily-rolled file, or writes
//! them to stderr when no log file can be opened. Every event carries the
//! fields of the `run` span opened in `main`: the subcommand and the
//! changelog it works on.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter, format::Writer, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "RELNOTES_LOG_PATH";
const ENV_LOG_DIR: &str = "RELNOTES_LOG_DIR";
const LOG_PREFIX: &str = "relnotes";
const LOG_SUFFIX: &str = "jsonl";

/// A daily-rolled log file: `<dir>/<prefix>.<YYYY-MM-DD>.<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// Directory holding the files; created on first use.
    pub dir: PathBuf,
    /// File name before the date.
    pub prefix: String,
    /// File extension after the date, if any.
    pub suffix: Option<String>,
}

impl LogFile {
    /// Where this run logs to, or `None` for stderr.
    ///
    /// `RELNOTES_LOG_PATH` wins, then `RELNOTES_LOG_DIR`, then `log_dir` from
    /// the config, then `logs/` in the platform data directory.
    pub fn resolve(config_dir: Option<&Path>) -> Option<Self> {
        let platform_dir = directories::ProjectDirs::from("", "", LOG_PREFIX)
            .map(|dirs| dirs.data_local_dir().join("logs"));
        Self::resolve_with(
            std::env::var_os(ENV_LOG_PATH),
            std::env::var_os(ENV_LOG_DIR),
            config_dir,
            platform_dir,
        )
    }

    fn resolve_with(
        path: Option<OsString>,
        dir: Option<OsString>,
        config_dir: Option<&Path>,
        platform_dir: Option<PathBuf>,
    ) -> Option<Self> {
        if let Some(file) = path
            .filter(|p| !p.is_empty())
            .and_then(|p| Self::from_path(Path::new(&p)))
        {
            return Some(file);
        }

        let dir = dir
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(|| config_dir.map(Path::to_path_buf))
            .or(platform_dir)?;
        Some(Self {
            dir,
            prefix: LOG_PREFIX.into(),
            suffix: Some(LOG_SUFFIX.into()),
        })
    }

    /// Split an explicit file path into directory, stem and extension. The
    /// date lands between the last two.
    fn from_path(path: &Path) -> Option<Self> {
        let prefix = path.file_stem()?.to_str()?.to_string();
        let suffix = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(String::from);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Some(Self {
            dir,
            prefix,
            suffix,
        })
    }

    /// Open the appender, creating the directory when needed.
    fn appender(&self) -> Result<RollingFileAppender, InitError> {
        let mut builder = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&self.prefix);
        if let Some(ref suffix) = self.suffix {
            builder = builder.filename_suffix(suffix);
        }
        builder.build(&self.dir)
    }
}

/// Keeps the background log writer alive. Dropping it flushes pending lines.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber, writing to `file` or else to stderr.
pub fn init_logging(filter: EnvFilter, file: Option<&LogFile>) -> LogGuard {
    let mut unusable = None;
    let (writer, worker) = match file.map(|f| (f, f.appender())) {
        Some((_, Ok(appender))) => tracing_appender::non_blocking(appender),
        Some((f, Err(e))) => {
            unusable = Some(format!("{}: {e}", f.dir.display()));
            tracing_appender::non_blocking(std::io::stderr())
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer(writer))
        .init();

    if let Some(reason) = unusable {
        tracing::warn!(%reason, "cannot open log file, logging to stderr");
    }
    LogGuard { _worker: worker }
}

/// Build the filter from `-q`, `-v`, `RUST_LOG` and the configured level, in
/// that order. `-v` and `-vv` only raise relnotes' own targets.
pub fn log_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    let level = match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    };
    if let Some(level) = level {
        return EnvFilter::new(format!("warn,relnotes={level},relnotes_core={level}"));
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// One JSON object per event, with the event's fields at the top level and
/// the innermost span's fields under `span`.
fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_timer(UtcMillis)
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
}

/// RFC 3339 timestamps in UTC with millisecond precision.
struct UtcMillis;

impl FormatTime for UtcMillis {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        w.write_str(&now)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(log_filter(true, 2, "info").to_string(), "error");
    }

    #[test]
    fn verbose_raises_only_relnotes_targets() {
        let debug = log_filter(false, 1, "info").to_string();
        assert!(debug.contains("relnotes=debug"), "{debug}");
        assert!(debug.contains("relnotes_core=debug"), "{debug}");
        assert!(debug.contains("warn"), "{debug}");

        let trace = log_filter(false, 3, "info").to_string();
        assert!(trace.contains("relnotes_core=trace"), "{trace}");
    }

    #[test]
    fn explicit_path_wins() {
        let file = LogFile::resolve_with(
            Some("/var/tmp/relnotes/run.log".into()),
            Some("/ignored".into()),
            Some(Path::new("/also-ignored")),
            None,
        )
        .unwrap();
        assert_eq!(
            file,
            LogFile {
                dir: PathBuf::from("/var/tmp/relnotes"),
                prefix: "run".into(),
                suffix: Some("log".into()),
            }
        );
    }

    #[test]
    fn bare_file_name_logs_to_current_directory() {
        let file = LogFile::resolve_with(Some("trace".into()), None, None, None).unwrap();
        assert_eq!(file.dir, PathBuf::from("."));
        assert_eq!(file.prefix, "trace");
        assert_eq!(file.suffix, None);
    }

    #[test]
    fn directories_resolve_in_order() {
        let platform = Some(PathBuf::from("/platform/logs"));
        let config = Some(Path::new("/from/config"));

        let from_env =
            LogFile::resolve_with(None, Some("/from/env".into()), config, platform.clone());
        assert_eq!(from_env.unwrap().dir, PathBuf::from("/from/env"));

        let from_config = LogFile::resolve_with(None, Some("".into()), config, platform.clone());
        let from_config = from_config.unwrap();
        assert_eq!(from_config.dir, PathBuf::from("/from/config"));
        assert_eq!(from_config.prefix, "relnotes");
        assert_eq!(from_config.suffix.as_deref(), Some("jsonl"));

        let from_platform = LogFile::resolve_with(None, None, None, platform);
        assert_eq!(from_platform.unwrap().dir, PathBuf::from("/platform/logs"));

        assert_eq!(LogFile::resolve_with(None, None, None, None), None);
    }

    #[test]
    fn appender_creates_dated_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = LogFile {
            dir: tmp.path().join("nested").join("logs"),
            prefix: "relnotes".into(),
            suffix: Some("jsonl".into()),
        };
        let mut appender = file.appender().unwrap();
        appender.write_all(b"{}\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&file.dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names[0].starts_with("relnotes.") && names[0].ends_with(".jsonl"));
    }

    #[test]
    fn appender_fails_when_directory_is_a_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let file = LogFile {
            dir: blocker.join("logs"),
            prefix: "relnotes".into(),
            suffix: None,
        };
        assert!(file.appender().is_err());
    }

    #[test]
    fn timestamps_are_rfc3339_with_millis() {
        let mut ts = String::new();
        UtcMillis.format_time(&mut Writer::new(&mut ts)).unwrap();
        assert!(ts.ends_with('Z'), "{ts}");
        assert_eq!(ts.len(), 24, "YYYY-MM-DDTHH:MM:SS.mmmZ: {ts}");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_carry_run_span_fields() {
        let buffer = Buffer::default();
        let sink = buffer.clone();
        let subscriber = tracing_subscriber::registry().with(json_layer(move || sink.clone()));
        tracing::subscriber::with_default(subscriber, || {
            let run = tracing::info_span!(
                "run",
                command = "release",
                changelog = "/repo/CHANGELOG.md"
            );
            let _run = run.enter();
            tracing::info!(version = "v1.1.0", written = true, "release cut");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["message"], "release cut");
        assert_eq!(line["version"], "v1.1.0");
        assert_eq!(line["written"], true);
        assert_eq!(line["span"]["name"], "run");
        assert_eq!(line["span"]["command"], "release");
        assert_eq!(line["span"]["changelog"], "/repo/CHANGELOG.md");
        assert!(line["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
