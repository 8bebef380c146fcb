//! Info command: show package, config, and repository information.

use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use relnotes_core::History;
use relnotes_core::config::{self, Config};
use relnotes_core::git::{GitCli, RepoInfo};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    repository: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            repository: env!("CARGO_PKG_REPOSITORY"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<String>,
    log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_dir: Option<String>,
    changelog: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    generator: Option<String>,
    locale: String,
}

impl ConfigInfo {
    fn from_config(config: &Config, cwd: &camino::Utf8Path) -> Self {
        Self {
            config_file: config::find_project_config(cwd).map(|p| p.to_string()),
            log_level: config.log_level.as_str().to_string(),
            log_dir: config.log_dir.as_ref().map(|p| p.to_string()),
            changelog: config.changelog_path(cwd).to_string(),
            generator: config.notes.generator.clone(),
            locale: config.notes.locale.as_str().to_string(),
        }
    }
}

#[derive(Serialize, Default)]
struct RepositoryInfo {
    is_repo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<RepoInfo>,
}

impl RepositoryInfo {
    /// Best effort: anything git cannot answer is left empty.
    fn detect(git: &GitCli) -> Self {
        if !git.is_inside_repo().unwrap_or(false) {
            return Self::default();
        }
        Self {
            is_repo: true,
            branch: git.current_branch().ok().flatten(),
            last_tag: git.last_tag().ok().flatten(),
            remote: git.repo_info().ok().flatten(),
        }
    }
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
    repository: RepositoryInfo,
}

/// Print package, configuration and repository information.
#[instrument(name = "cmd_info", skip_all)]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing info command");

    let info = FullInfo {
        package: PackageInfo::new(),
        config: ConfigInfo::from_config(config, cwd),
        repository: RepositoryInfo::detect(&super::history(config, cwd)),
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{} {}", info.package.name.bold(), info.package.version.green());
    if !info.package.description.is_empty() {
        println!("{}", info.package.description);
    }
    if !info.package.license.is_empty() {
        println!("{}: {}", "License".dimmed(), info.package.license);
    }
    if !info.package.repository.is_empty() {
        println!("{}: {}", "Repository".dimmed(), info.package.repository.cyan());
    }

    println!();
    println!("{}", "Configuration".bold().underline());
    match info.config.config_file {
        Some(ref path) => println!("{}: {}", "Config file".dimmed(), path.cyan()),
        None => println!("{}: {}", "Config file".dimmed(), "none loaded".yellow()),
    }
    println!("{}: {}", "Log level".dimmed(), info.config.log_level);
    if let Some(ref dir) = info.config.log_dir {
        println!("{}: {}", "Log directory".dimmed(), dir);
    }
    println!("{}: {}", "Changelog".dimmed(), info.config.changelog.cyan());
    match info.config.generator {
        Some(ref cmd) => println!("{}: {}", "Notes generator".dimmed(), cmd.cyan()),
        None => println!("{}: {}", "Notes generator".dimmed(), "built-in".dimmed()),
    }
    println!("{}: {}", "Locale".dimmed(), info.config.locale);

    println!();
    println!("{}", "Repository".bold().underline());
    let repo = &info.repository;
    if !repo.is_repo {
        println!("  {} {}", "○".yellow(), "Not a git repository".yellow());
        return Ok(());
    }
    if let Some(ref branch) = repo.branch {
        println!("{}: {}", "Branch".dimmed(), branch.cyan());
    }
    match repo.last_tag {
        Some(ref tag) => println!("{}: {}", "Last tag".dimmed(), tag.cyan()),
        None => println!("{}: {}", "Last tag".dimmed(), "none (first release)".yellow()),
    }
    if let Some(ref remote) = repo.remote {
        println!("{}: {}", "Remote".dimmed(), remote.web_url().cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_info_text_and_json() {
        let cwd = camino::Utf8PathBuf::from("/tmp");
        assert!(cmd_info(InfoArgs::default(), false, &Config::default(), &cwd).is_ok());
        assert!(cmd_info(InfoArgs::default(), true, &Config::default(), &cwd).is_ok());
    }

    #[test]
    fn test_config_info_defaults() {
        let cwd = camino::Utf8PathBuf::from("/nonexistent");
        let info = ConfigInfo::from_config(&Config::default(), &cwd);
        assert!(info.config_file.is_none());
        assert_eq!(info.log_level, "info");
        assert_eq!(info.changelog, "/nonexistent/CHANGELOG.md");
        assert_eq!(info.locale, "en");
    }

    #[test]
    fn test_repository_detect_outside_repo() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let info = RepositoryInfo::detect(&GitCli::new(&root));
        if !info.is_repo {
            assert!(info.branch.is_none() && info.remote.is_none());
        }
    }
}
