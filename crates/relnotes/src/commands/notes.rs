//! Notes command: preview the next release without touching the changelog.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use relnotes_core::changelog::merge::build_changelog_from_notes;
use relnotes_core::config::Config;
use relnotes_core::notes::{NotesGenerator, ReleaseNotes, synthesize_notes};
use relnotes_core::prompt::Locale;
use relnotes_core::release::{PlanOptions, Release, plan_release};

/// Arguments for the `notes` subcommand.
#[derive(Args, Debug, Default)]
pub struct NotesArgs {
    /// Use the built-in notes even when a generator is configured
    #[arg(long)]
    pub no_ai: bool,

    /// Language of the generated notes (overrides config)
    #[arg(long, value_enum, value_name = "LOCALE")]
    pub locale: Option<Locale>,

    /// Skip diff statistics and contributors
    #[arg(long)]
    pub no_stats: bool,
}

#[derive(Serialize)]
struct NotesPreview<'a> {
    release: &'a Release,
    changes: usize,
    notes: &'a ReleaseNotes,
    fragment: &'a str,
}

/// Execute the notes command.
#[instrument(name = "cmd_notes", skip_all, fields(no_ai = args.no_ai))]
pub fn cmd_notes(
    args: NotesArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let history = super::history(config, cwd);
    let release = match plan_release(
        &history,
        PlanOptions {
            no_stats: args.no_stats,
        },
    ) {
        Ok(release) => release,
        Err(e) if e.is_nothing_to_release() => {
            super::print_nothing_to_release(&e, global_json);
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to read commit history"),
    };

    let generator = super::generator(config, &history, cwd, args.no_ai, args.locale);
    debug!(generator = generator.is_some(), "synthesizing notes");
    let notes = synthesize_notes(
        &release,
        generator.as_ref().map(|g| g as &dyn NotesGenerator),
    )
    .context("failed to generate release notes")?;
    let fragment = build_changelog_from_notes(&history, &release, &notes);

    if global_json {
        let preview = NotesPreview {
            release: &release,
            changes: release.item_count(),
            notes: &notes,
            fragment: &fragment,
        };
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        let changes = release.item_count();
        eprintln!(
            "{}: {} → {} ({}, {changes} {})",
            "Next release".bold(),
            release.previous_version.dimmed(),
            release.version.green().bold(),
            release.version_bump,
            if changes == 1 { "change" } else { "changes" },
        );
        if release.is_unchanged() {
            eprintln!(
                "{}",
                "No feature, fix or breaking change: the version stays the same.".yellow()
            );
        }
        eprintln!();
        print!("{fragment}");
    }
    Ok(())
}
