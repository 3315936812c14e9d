// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `OpenUsage` CLI - AI coding assistant quota monitoring from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Show usage for every enabled provider
//! openusage
//!
//! # Only some providers
//! openusage -p claude,cursor
//!
//! # JSON output
//! openusage --format json --pretty
//!
//! # Sign in to Copilot with a device code
//! openusage login copilot
//!
//! # Watch mode, refreshing every minute
//! openusage watch --interval 1m
//! ```

mod app;
mod commands;
mod output;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use openusage_store::LogLevel;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, login, paths, providers, usage, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// `OpenUsage` CLI - quota monitoring for AI coding assistants.
#[derive(Parser)]
#[command(name = "openusage")]
#[command(about = "Quota and usage monitoring for AI coding assistants")]
#[command(long_about = r"
OpenUsage reads the credentials your AI coding tools already store and
reports how much of each plan's quota is left.

Supported providers:
  • Claude (claude)
  • Codex (codex)
  • GitHub Copilot (copilot)
  • Cursor (cursor)

Examples:
  openusage                      # Every enabled provider
  openusage -p codex             # Single provider
  openusage --format json        # JSON output
  openusage login copilot        # Device-code sign-in
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. If none, runs 'usage' by default.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Providers to query, comma-separated ("all" for every provider).
    /// Defaults to the enabled providers.
    #[arg(long, short, global = true)]
    pub provider: Option<String>,

    /// Verbose output (debug logging).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (no logging, minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Directory holding settings.json.
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory holding provider state (device flow, owned credentials).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch current usage (default if no command specified).
    #[command(visible_alias = "u")]
    Usage,

    /// Keep refreshing and redraw on every change.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),

    /// Sign in to a provider that supports device authorization.
    Login(login::LoginArgs),

    /// List available providers.
    #[command(visible_alias = "p")]
    Providers,

    /// Manage configuration.
    Config(config::ConfigArgs),

    /// Show config, data and log locations.
    Paths,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// A provider failed, or the command itself failed.
    Error = 1,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(cli: &Cli, level: LogLevel) -> Result<()> {
    if cli.quiet {
        return Ok(());
    }

    let filter = if cli.verbose {
        EnvFilter::new("openusage=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("openusage={level}")))
    };

    let writer = match &cli.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_ansi(cli.log_file.is_none() && !cli.no_color)
                .with_writer(writer),
        )
        .with(filter)
        .init();
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = app::load_settings(&cli).await?;
    setup_logging(&cli, settings.get().await.log_level)?;

    let result = match &cli.command {
        None | Some(Commands::Usage) => usage::run(&cli, settings).await,
        Some(Commands::Watch(args)) => watch::run(args, &cli, settings).await,
        Some(Commands::Login(args)) => login::run(args, &cli, settings).await,
        Some(Commands::Providers) => providers::run(&cli, &settings).await,
        Some(Commands::Config(args)) => config::run(args, &cli, settings).await,
        Some(Commands::Paths) => paths::run(&cli, &settings),
    };

    match result {
        Ok(ExitCode::Success) => Ok(()),
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(ExitCode::Error as i32);
        }
    }
}
