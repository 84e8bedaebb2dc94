// src/main.rs

mod archive;
mod backtrace;
mod cli;
mod config;
mod error;
mod history;
mod merge;
mod model;
mod pipeline;
mod progress;
mod sampler;
mod sources;
mod spike;
mod store;
#[cfg(test)]
mod testing;
mod walker;
mod window;

use archive::LocalArchive;
use chrono::Utc;
use clap::Parser;
use cli::{Args, Command, GenerateArgs, LogFormat, ShowArgs};
use config::{FileConfig, Settings};
use error::{Error, Result};
use history::GitHistory;
use pipeline::Services;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use store::CacheStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.log_format);
    let start_time = Instant::now();

    match run(&args) {
        Ok(()) => {
            info!(elapsed = ?start_time.elapsed(), "finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "crash-blame failed");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout only carries command output.
fn init_logging(verbose: u8, format: LogFormat) {
    let fallback = match verbose {
        0 => "crash_blame=info",
        1 => "crash_blame=debug",
        _ => "crash_blame=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: &Args) -> Result<()> {
    let config = FileConfig::load(args.config.as_deref())?;
    match &args.command {
        Command::Generate(generate_args) => generate(generate_args, &config),
        Command::Dates { output } => {
            let store = CacheStore::open(locate(output.as_deref(), config.guilty_patches.output.as_deref(), "output directory")?)?;
            let dates: Vec<String> = store.dates()?.iter().map(|date| date.format("%Y-%m-%d").to_string()).collect();
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "dates": dates }))?);
            Ok(())
        }
        Command::Show(show_args) => show(show_args, &config),
    }
}

/// The command line value if given, else the configured one.
fn locate(flag: Option<&Path>, configured: Option<&Path>, what: &'static str) -> Result<PathBuf> {
    flag.or(configured).map(Path::to_path_buf).ok_or(Error::MissingLocation(what))
}

fn generate(args: &GenerateArgs, config: &FileConfig) -> Result<()> {
    let locations = &config.guilty_patches;
    let store = CacheStore::open(locate(args.output.as_deref(), locations.output.as_deref(), "output directory")?)?;
    let archive_dir = locate(args.archive.as_deref(), locations.archive.as_deref(), "crash archive")?;
    let repo_dir = locate(args.repo.as_deref(), locations.repo.as_deref(), "repository")?;

    let mut settings = Settings::new(&args.product, &args.channel, args.lookback_days, args.threshold, &config.pipeline)?;
    settings.show_progress = !args.no_progress;
    let reference = args.date.resolve(Utc::now().date_naive());

    let archive = LocalArchive::open(&archive_dir, settings.show_progress)?;
    let history = GitHistory::open(&repo_dir)?;
    let services = Services { search: &archive, payloads: &archive, history: &history };

    let summary = pipeline::generate(services, &settings, &store, reference)?;
    info!(
        date = %reference,
        spiking = summary.spiking,
        inserted = summary.inserted,
        absorbed = summary.absorbed,
        "generate done"
    );
    Ok(())
}

fn show(args: &ShowArgs, config: &FileConfig) -> Result<()> {
    let store = CacheStore::open(locate(args.output.as_deref(), config.guilty_patches.output.as_deref(), "output directory")?)?;
    let reference = args.date.resolve(Utc::now().date_naive());
    let results = store.get(reference, &args.product, &args.channel)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
