//! Stage command: add a bullet to the Unreleased section.

use anyhow::{Context, bail};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::instrument;

use relnotes_core::changelog::merge::stage_unreleased_entry;
use relnotes_core::config::Config;

/// Arguments for the `stage` subcommand.
#[derive(Args, Debug, Default)]
pub struct StageArgs {
    /// Entry text (a leading "- " is optional)
    pub text: String,

    /// File the entry under this `###` heading (e.g. "Added")
    #[arg(long, short, value_name = "NAME")]
    pub section: Option<String>,
}

#[derive(Serialize)]
struct StageOutcome<'a> {
    path: String,
    section: Option<&'a str>,
    text: &'a str,
}

/// Execute the stage command.
#[instrument(name = "cmd_stage", skip_all, fields(section = ?args.section))]
pub fn cmd_stage(
    args: StageArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let text = args.text.trim();
    if text.is_empty() {
        bail!("nothing to stage: entry text is empty");
    }

    let path = config.changelog_path(cwd);
    stage_unreleased_entry(&path, args.section.as_deref(), text)
        .with_context(|| format!("failed to stage entry in {path}"))?;

    if global_json {
        let outcome = StageOutcome {
            path: path.to_string(),
            section: args.section.as_deref(),
            text,
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        let target = args
            .section
            .as_deref()
            .map_or_else(|| "Unreleased".to_string(), |s| format!("Unreleased › {s}"));
        println!("{} staged under {}", "✓".green(), target.bold());
    }
    Ok(())
}
