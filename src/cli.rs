// src/cli.rs

use crate::window::DateSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file; defaults to ./crash-blame.toml, then ~/.crash-blame.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect spiking signatures and attribute them to recent patches
    Generate(GenerateArgs),

    /// List the dates with cached results, most recent first
    Dates {
        /// Cache directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the cached results of one product and channel
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Release channel
    #[arg(short, long, default_value = "nightly")]
    pub channel: String,

    #[arg(short, long, default_value = "Firefox")]
    pub product: String,

    /// Reference date: today, yesterday or YYYY-MM-DD
    #[arg(short, long, default_value = "today")]
    pub date: DateSpec,

    /// Number of days before the last one that must be (almost) crash free
    #[arg(short = 'm', long = "max", default_value_t = 3)]
    pub lookback_days: u32,

    /// Crashes needed on the last day
    #[arg(short, long, default_value_t = 5)]
    pub threshold: u64,

    /// Cache directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory of processed crash documents (*.json)
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Git checkout whose history is searched for patches
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    #[arg(short, long, default_value = "nightly")]
    pub channel: String,

    #[arg(short, long, default_value = "Firefox")]
    pub product: String,

    /// today, yesterday or YYYY-MM-DD
    #[arg(short, long, default_value = "today")]
    pub date: DateSpec,

    /// Cache directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn generate_defaults() {
        let args = Args::parse_from(["crash-blame", "generate"]);
        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.channel, "nightly");
        assert_eq!(generate.product, "Firefox");
        assert_eq!(generate.date, DateSpec::Today);
        assert_eq!(generate.lookback_days, 3);
        assert_eq!(generate.threshold, 5);
        assert!(!generate.no_progress);
        assert_eq!(args.log_format, LogFormat::Pretty);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = Args::parse_from(["crash-blame", "show", "-d", "2016-10-18", "-c", "beta", "-vv", "--log-format", "json"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.log_format, LogFormat::Json);
        let Command::Show(show) = args.command else {
            panic!("expected show");
        };
        assert_eq!(show.channel, "beta");
        assert_eq!(show.date, DateSpec::Day(NaiveDate::from_ymd_opt(2016, 10, 18).unwrap()));
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Args::try_parse_from(["crash-blame", "generate", "-d", "18/10/2016"]).is_err());
    }
}
