//! Library interface for the `relnotes` CLI.
//!
//! Exposes the argument parser and command structure for documentation
//! generation and testing. The entry point is in `main.rs`.
//!
//! # Structure
//!
//! - [`Cli`] - The root argument parser (clap derive)
//! - [`Commands`] - Available subcommands
//! - [`commands`] - Command implementations
//!
//! The [`command()`] function returns the clap `Command` used by `xtask` to
//! generate man pages and shell completions.

pub mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Color output preference.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect terminal capabilities automatically.
    #[default]
    Auto,
    /// Always emit colors.
    Always,
    /// Never emit colors.
    Never,
}

impl ColorChoice {
    /// Set the global color mode. Call once at startup.
    pub fn apply(self) {
        match self {
            Self::Auto => {}
            Self::Always => owo_colors::set_override(true),
            Self::Never => owo_colors::set_override(false),
        }
    }
}

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    RUST_LOG             Log filter (e.g., debug, relnotes_core=trace)
    RELNOTES_LOG_PATH    Explicit log file path
    RELNOTES_LOG_DIR     Log directory
";

/// Command-line interface definition for relnotes.
#[derive(Parser)]
#[command(name = "relnotes")]
#[command(about = "Conventional-commit release notes and a changelog that stays tidy", long_about = None)]
#[command(version)]
#[command(after_long_help = ENV_HELP)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Only print errors (suppresses warnings/info)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More detail (repeatable; e.g. -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Colorize output
    #[arg(long, global = true, value_enum, default_value_t)]
    pub color: ColorChoice,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands for the CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Create the changelog or add a missing Unreleased section
    Init(commands::init::InitArgs),

    /// Add an entry to the Unreleased section
    Stage(commands::stage::StageArgs),

    /// Preview the next version and its changelog entry
    Notes(commands::notes::NotesArgs),

    /// Cut a release: write the changelog entry and optionally publish
    Release(commands::release::ReleaseArgs),

    /// Check the changelog for structural problems
    Validate(commands::validate::ValidateArgs),

    /// Show package, configuration and repository information
    Info(commands::info::InfoArgs),
}

impl Commands {
    /// The subcommand's name on the command line.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Stage(_) => "stage",
            Self::Notes(_) => "notes",
            Self::Release(_) => "release",
            Self::Validate(_) => "validate",
            Self::Info(_) => "info",
        }
    }
}

/// Returns the clap command for documentation generation
pub fn command() -> clap::Command {
    Cli::command()
}
