//! Validate command: audit the changelog.

use anyhow::{Context, bail};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::instrument;

use relnotes_core::changelog::validate::{ChangelogWarning, validate_changelog};
use relnotes_core::config::Config;

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    /// Exit with an error when any warning is reported
    #[arg(long)]
    pub strict: bool,

    /// Minimum body length in characters (overrides config)
    #[arg(long, value_name = "CHARS")]
    pub min_length: Option<usize>,
}

#[derive(Serialize)]
struct ValidateReport<'a> {
    path: String,
    warnings: &'a [ChangelogWarning],
}

/// Execute the validate command.
#[instrument(name = "cmd_validate", skip_all, fields(strict = args.strict))]
pub fn cmd_validate(
    args: ValidateArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let path = config.changelog_path(cwd);
    let min_length = args
        .min_length
        .unwrap_or(config.changelog.min_content_length);
    let warnings =
        validate_changelog(&path, min_length).with_context(|| format!("failed to read {path}"))?;

    if global_json {
        let report = ValidateReport {
            path: path.to_string(),
            warnings: &warnings,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if warnings.is_empty() {
        println!("{} {} looks good", "✓".green(), path.cyan());
    } else {
        for warning in &warnings {
            println!(
                "  {} {} {}: {}",
                "!".yellow(),
                format!("[{}]", warning.version).bold(),
                warning.kind.to_string().yellow(),
                warning.message
            );
        }
        println!();
        println!(
            "{} warning{} in {}",
            warnings.len(),
            if warnings.len() == 1 { "" } else { "s" },
            path.cyan()
        );
    }

    if args.strict && !warnings.is_empty() {
        bail!("{} changelog warning(s) in strict mode", warnings.len());
    }
    Ok(())
}
