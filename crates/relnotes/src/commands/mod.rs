//! Command implementations

pub mod info;

pub mod init;

pub mod notes;

pub mod release;

pub mod stage;

pub mod validate;

use camino::Utf8Path;
use owo_colors::OwoColorize;

use relnotes_core::History;
use relnotes_core::config::Config;
use relnotes_core::git::GitCli;
use relnotes_core::notes::CommandGenerator;
use relnotes_core::prompt::Locale;

/// History reader for the repository at `cwd`, honoring the configured remote.
pub fn history(config: &Config, cwd: &Utf8Path) -> GitCli {
    GitCli::new(cwd).with_remote(&config.release.remote)
}

/// The configured notes generator, unless disabled or not configured.
///
/// The project name in the prompt is the repository name when the remote
/// is known, the directory name otherwise.
pub fn generator(
    config: &Config,
    history: &GitCli,
    cwd: &Utf8Path,
    no_ai: bool,
    locale: Option<Locale>,
) -> Option<CommandGenerator> {
    if no_ai {
        return None;
    }
    let command = config.notes.generator.as_deref()?;
    let project = history
        .repo_info()
        .ok()
        .flatten()
        .map(|info| info.repo)
        .or_else(|| cwd.file_name().map(String::from))
        .unwrap_or_else(|| "this project".to_string());

    Some(
        CommandGenerator::new(command, project)
            .with_locale(locale.unwrap_or(config.notes.locale))
            .with_timeout(config.notes.timeout())
            .with_cwd(cwd),
    )
}

/// Tell the user there is nothing to release. Not an error.
pub fn print_nothing_to_release(reason: &dyn std::fmt::Display, global_json: bool) {
    if global_json {
        let value = serde_json::json!({
            "status": "nothing_to_release",
            "reason": reason.to_string(),
        });
        println!("{value}");
    } else {
        println!("{} {}", "○".yellow(), reason.to_string().dimmed());
    }
}
