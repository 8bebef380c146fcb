//! relnotes CLI
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use relnotes::{Cli, Commands, commands};
use relnotes_core::config::ConfigLoader;
use tracing::debug;

mod observability;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.color.apply();

    if let Some(ref dir) = cli.chdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to change directory to {}", dir.display()))?;
    }

    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let cwd = camino::Utf8PathBuf::try_from(cwd).map_err(|e| {
        anyhow::anyhow!(
            "current directory is not valid UTF-8: {}",
            e.into_path_buf().display()
        )
    })?;
    let mut loader = ConfigLoader::new().with_project_search(&cwd);
    if let Some(ref config_path) = cli.config {
        let config_path = camino::Utf8PathBuf::try_from(config_path.clone()).map_err(|e| {
            anyhow::anyhow!(
                "config path is not valid UTF-8: {}",
                e.into_path_buf().display()
            )
        })?;
        loader = loader.with_file(&config_path);
    }
    let config = loader.load().context("failed to load configuration")?;

    let log_file =
        observability::LogFile::resolve(config.log_dir.as_ref().map(|dir| dir.as_std_path()));
    let filter = observability::log_filter(cli.quiet, cli.verbose, config.log_level.as_str());
    let _guard = observability::init_logging(filter, log_file.as_ref());

    let run = tracing::info_span!(
        "run",
        command = cli.command.name(),
        changelog = %config.changelog_path(&cwd)
    );
    let _run = run.enter();

    debug!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        json = cli.json,
        color = ?cli.color,
        chdir = ?cli.chdir,
        log_file = ?log_file,
        "CLI initialized"
    );

    let result = match cli.command {
        Commands::Init(args) => commands::init::cmd_init(args, cli.json, &config, &cwd),
        Commands::Stage(args) => commands::stage::cmd_stage(args, cli.json, &config, &cwd),
        Commands::Notes(args) => commands::notes::cmd_notes(args, cli.json, &config, &cwd),
        Commands::Release(args) => commands::release::cmd_release(args, cli.json, &config, &cwd),
        Commands::Validate(args) => {
            commands::validate::cmd_validate(args, cli.json, &config, &cwd)
        }
        Commands::Info(args) => commands::info::cmd_info(args, cli.json, &config, &cwd),
    };
    if let Err(ref err) = result {
        tracing::error!(error = %err, "fatal error");
    }
    result
}
