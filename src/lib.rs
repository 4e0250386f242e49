pub mod args;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod galaxy;
pub mod navigator;
pub mod pathenv;
pub mod pipeline;
pub mod play;
pub mod staging;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::executor::CommandExecutor;
use crate::pipeline::Pipeline;
use crate::staging::{FileStager, LocalStager};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads a profile, normalizes its paths and validates it.
///
/// Relative paths resolve against the profile file's directory, and
/// execution-environment defaults are filled in before validation.
pub fn load_and_prepare(file: &Utf8Path) -> Result<config::Profile> {
    let mut profile = config::load_profile(file)
        .with_context(|| format!("failed to load profile from {}", file))?;

    let base_dir = file.parent().unwrap_or(Utf8Path::new("."));
    profile.resolve_paths(base_dir);
    if let Some(ref mut navigator) = profile.navigator {
        navigator.apply_ee_defaults();
    }
    profile.validate().context("profile validation failed")?;

    Ok(profile)
}

pub fn run_apply(opts: &cli::ApplyArgs, executor: Arc<dyn CommandExecutor>) -> Result<()> {
    let profile = load_and_prepare(&opts.file)?;

    let stager: Arc<dyn FileStager> = Arc::new(LocalStager);
    Pipeline::new(
        &profile,
        executor,
        stager,
        opts.dry_run,
        opts.log_level.is_verbose(),
    )
    .run()
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = load_and_prepare(&opts.file)?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}

pub fn run_completions(opts: &cli::CompletionsArgs) {
    let mut cmd = cli::Cli::command();
    generate(opts.shell, &mut cmd, env!("CARGO_PKG_NAME"), &mut io::stdout());
}
