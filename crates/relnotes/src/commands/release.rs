//! Release command: thin CLI layer over `relnotes_core::cut`.

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use tracing::{debug, info, instrument};

use relnotes_core::config::Config;
use relnotes_core::cut::{self, CutEvent, CutOptions, CutOutcome, CutPhase, CutPlan};
use relnotes_core::notes::NotesGenerator;
use relnotes_core::publish::{GhPublisher, ReleasePublisher};

/// Arguments for the `release` subcommand.
#[derive(Args, Debug, Default)]
pub struct ReleaseArgs {
    /// Use the built-in notes even when a generator is configured
    #[arg(long)]
    pub no_ai: bool,

    /// Preview what would happen without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Create a GitHub release after writing the changelog (overrides config)
    #[arg(long, conflicts_with = "no_publish")]
    pub publish: bool,

    /// Only write the changelog (overrides config)
    #[arg(long, conflicts_with = "publish")]
    pub no_publish: bool,

    /// Create the GitHub release as a draft (overrides config)
    #[arg(long, conflicts_with = "no_draft")]
    pub draft: bool,

    /// Create the GitHub release as published, not draft (overrides config)
    #[arg(long, conflicts_with = "draft")]
    pub no_draft: bool,

    /// Skip diff statistics and contributors
    #[arg(long)]
    pub no_stats: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl ReleaseArgs {
    fn should_publish(&self, config: &Config) -> bool {
        if self.publish {
            true
        } else if self.no_publish {
            false
        } else {
            config.release.publish
        }
    }

    fn draft(&self, config: &Config) -> bool {
        if self.draft {
            true
        } else if self.no_draft {
            false
        } else {
            config.release.draft
        }
    }
}

/// Execute the release command.
#[instrument(name = "cmd_release", skip_all, fields(dry_run = args.dry_run))]
pub fn cmd_release(
    args: ReleaseArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let options = CutOptions {
        dry_run: args.dry_run,
        draft: args.draft(config),
        no_stats: args.no_stats,
    };
    let publish = args.should_publish(config);
    debug!(?options, publish, "executing release command");

    if publish && !options.dry_run && !GhPublisher::is_available() {
        bail!("publishing needs the GitHub CLI (gh) on PATH; install it or pass --no-publish");
    }

    let history = super::history(config, cwd);
    let generator = super::generator(config, &history, cwd, args.no_ai, None);
    let publisher = publish.then(|| GhPublisher::new(cwd));
    let changelog = config.changelog_path(cwd);

    let mut progress = Progress::new(global_json, options.dry_run);
    let planned = cut::plan_cut(
        &history,
        generator.as_ref().map(|g| g as &dyn NotesGenerator),
        &changelog,
        options,
        &mut |event| progress.handle(event),
    );
    let plan = match planned {
        Ok(plan) => plan,
        Err(e) if e.is_nothing_to_release() => {
            progress.clear();
            super::print_nothing_to_release(&e, global_json);
            return Ok(());
        }
        Err(e) => {
            progress.clear();
            return Err(e).context("release planning failed");
        }
    };

    if !global_json {
        print_plan(&plan, options.dry_run, publish);
    }

    let needs_confirm = !options.dry_run && !global_json && !args.yes && config.release.confirm;
    if needs_confirm {
        if !std::io::stdin().is_terminal() {
            bail!("refusing to write without confirmation; pass --yes to skip the prompt");
        }
        let confirmed = Confirm::new("Write this release?")
            .with_default(true)
            .prompt()
            .context("confirmation prompt failed")?;
        if !confirmed {
            println!("{}", "Release cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    let outcome = plan
        .execute(
            publisher.as_ref().map(|p| p as &dyn ReleasePublisher),
            options,
            &mut |event| progress.handle(event),
        )
        .context("release failed")?;

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}

fn print_plan(plan: &CutPlan, is_dry: bool, publish: bool) {
    let release = &plan.release;
    if is_dry {
        println!("\n{}", "DRY RUN: no changes will be made".yellow().bold());
    }
    println!(
        "\n{}: {} → {} ({})",
        "Release".bold(),
        release.previous_version.dimmed(),
        release.version.green().bold(),
        release.version_bump,
    );
    println!(
        "{}: {} | {}: {} | {}: {}",
        "Changelog".dimmed(),
        plan.changelog_path,
        "Staged entries".dimmed(),
        if plan.included_staged { "yes" } else { "no" },
        "Publish".dimmed(),
        if publish { "yes" } else { "no" },
    );
    println!();
    for line in plan.entry.fragment.lines() {
        println!("  {}", line.dimmed());
    }
    println!();
}

fn print_summary(outcome: &CutOutcome) {
    println!();
    if outcome.dry_run {
        println!(
            "{} Dry run complete, {} left untouched",
            "✓".green(),
            outcome.changelog_path,
        );
        return;
    }
    println!(
        "{} Released {} in {}",
        "✓".green().bold(),
        outcome.version.green().bold(),
        outcome.changelog_path,
    );
    if let Some(ref url) = outcome.release_url {
        println!("  {}: {}", "Release".dimmed(), url.cyan());
    }
}

/// Terminal progress for cut events: a spinner while a phase runs, a line
/// when it finishes.
struct Progress {
    quiet: bool,
    is_dry: bool,
    spinner: Option<ProgressBar>,
}

impl Progress {
    const fn new(quiet: bool, is_dry: bool) -> Self {
        Self {
            quiet,
            is_dry,
            spinner: None,
        }
    }

    fn handle(&mut self, event: CutEvent) {
        match &event {
            CutEvent::Started(phase) => debug!(%phase, "cut phase started"),
            CutEvent::Completed(phase) => info!(%phase, "cut phase completed"),
            CutEvent::Skipped(phase, reason) => info!(%phase, %reason, "cut phase skipped"),
        }
        if self.quiet {
            return;
        }
        match event {
            CutEvent::Started(phase) => {
                self.clear();
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("  {spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
                );
                spinner.set_message(phase_message(phase));
                spinner.enable_steady_tick(Duration::from_millis(80));
                self.spinner = Some(spinner);
            }
            CutEvent::Completed(phase) => {
                self.clear();
                let prefix = if self.is_dry { "○" } else { "✓" };
                println!("  {} {}", prefix.green(), phase.to_string().bold());
            }
            CutEvent::Skipped(phase, reason) => {
                self.clear();
                println!(
                    "  {} {} {}",
                    "–".yellow(),
                    phase.to_string().bold(),
                    format!("skipped: {reason}").dimmed(),
                );
            }
        }
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

const fn phase_message(phase: CutPhase) -> &'static str {
    match phase {
        CutPhase::Plan => "reading commit history...",
        CutPhase::Notes => "writing release notes...",
        CutPhase::Changelog => "updating changelog...",
        CutPhase::Publish => "publishing release...",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.release.publish = true;
        config.release.draft = true;

        let args = ReleaseArgs {
            no_publish: true,
            no_draft: true,
            ..ReleaseArgs::default()
        };
        assert!(!args.should_publish(&config));
        assert!(!args.draft(&config));

        let args = ReleaseArgs::default();
        assert!(args.should_publish(&config));
        assert!(args.draft(&config));
    }

    #[test]
    fn quiet_progress_ignores_events() {
        let mut progress = Progress::new(true, false);
        progress.handle(CutEvent::Started(CutPhase::Notes));
        assert!(progress.spinner.is_none());
    }
}
