//! Command-line interface for artifact-sanity.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::Overrides;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" | "err" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => return Err(format!("invalid log level '{trimmed}'")),
        };

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for artifact-sanity.
#[derive(Parser)]
#[command(name = "artifact-sanity", version)]
#[command(
    about = "Installs a Scylla package build and verifies the host it lands on",
    long_about = None
)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Path to the configuration file (defaults to `artifact-sanity.yaml` when present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not forward the product logs while installing.
    #[arg(long = "no-follow-logs", global = true)]
    pub no_follow_logs: bool,

    /// Print the verification report as JSON on success.
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Installation inputs that override the configuration file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// URL or path of the repository descriptor.
    #[arg(long)]
    pub sw_repo: Option<String>,

    /// `ci`, `release`, or a historical release tag such as `1.1`.
    #[arg(long)]
    pub mode: Option<String>,

    /// Validate a preinstalled cloud image instead of installing packages.
    #[arg(long)]
    pub ami: bool,
}

impl From<&InstallArgs> for Overrides {
    fn from(args: &InstallArgs) -> Self {
        Overrides {
            sw_repo: args.sw_repo.clone(),
            mode: args.mode.clone(),
            ami: args.ami,
        }
    }
}

/// Available commands for artifact-sanity.
#[derive(Subcommand)]
pub enum Commands {
    /// Install (once), verify the host and run the client workload.
    Install(InstallArgs),

    /// Stop then start the service group and re-verify.
    StopStart(InstallArgs),

    /// Restart the service group and re-verify.
    Restart(InstallArgs),

    /// Run install, stop-start and restart in sequence.
    All(InstallArgs),

    /// Print the installer variant that would run, without touching the host.
    Select(InstallArgs),
}

impl Commands {
    pub fn install_args(&self) -> &InstallArgs {
        match self {
            Commands::Install(args)
            | Commands::StopStart(args)
            | Commands::Restart(args)
            | Commands::All(args)
            | Commands::Select(args) => args,
        }
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "artifact-sanity",
            "install",
            "--sw-repo",
            "http://repo/scylla.list",
            "--mode",
            "release",
        ])
        .unwrap();
        let overrides = Overrides::from(cli.command.install_args());
        assert_eq!(overrides.sw_repo.as_deref(), Some("http://repo/scylla.list"));
        assert_eq!(overrides.mode.as_deref(), Some("release"));
        assert!(!overrides.ami);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "artifact-sanity",
            "select",
            "--ami",
            "--config",
            "custom.yaml",
            "--log-level",
            "4",
            "--no-follow-logs",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Select(ref args) if args.ami));
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert_eq!(cli.log_level.unwrap().as_str(), "debug");
        assert!(cli.no_follow_logs);
    }

    #[test]
    fn log_levels_parse_names_and_numbers() {
        assert_eq!("warning".parse::<LogLevelArg>().unwrap().as_str(), "warn");
        assert_eq!("0".parse::<LogLevelArg>().unwrap().as_str(), "off");
        assert!("9".parse::<LogLevelArg>().is_err());
        assert!("loud".parse::<LogLevelArg>().is_err());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["artifact-sanity"]).is_err());
        assert!(Cli::try_parse_from(["artifact-sanity", "status"]).is_err());
    }
}
