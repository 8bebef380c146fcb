//! Init command: create the changelog or give it an Unreleased section.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use relnotes_core::changelog::merge::ensure_unreleased_section;
use relnotes_core::config::Config;

/// Arguments for the `init` subcommand.
#[derive(Args, Debug, Default)]
pub struct InitArgs {}

#[derive(Serialize)]
struct InitOutcome {
    path: String,
    changed: bool,
}

/// Execute the init command.
#[instrument(name = "cmd_init", skip_all)]
pub fn cmd_init(
    _args: InitArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let path = config.changelog_path(cwd);
    debug!(%path, "ensuring Unreleased section");

    let changed = ensure_unreleased_section(&path)
        .with_context(|| format!("failed to prepare {path}"))?;

    if global_json {
        let outcome = InitOutcome {
            path: path.to_string(),
            changed,
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if changed {
        println!("{} {} is ready for staging", "✓".green(), path.cyan());
    } else {
        println!(
            "{} {} already has an Unreleased section",
            "○".dimmed(),
            path.cyan()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = camino::Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let config = Config::default();

        cmd_init(InitArgs::default(), true, &config, &cwd).unwrap();
        let first = std::fs::read_to_string(cwd.join("CHANGELOG.md")).unwrap();
        cmd_init(InitArgs::default(), false, &config, &cwd).unwrap();
        let second = std::fs::read_to_string(cwd.join("CHANGELOG.md")).unwrap();

        assert_eq!(first, second);
        assert!(first.contains("## [Unreleased]"));
    }
}
