//! Clap derive structures for the `stockpulse` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// stockpulse -- RFID reader ingestion and PLC panel sync
#[derive(Debug, Parser)]
#[command(
    name = "stockpulse",
    version,
    about = "Ingest RFID reader scans into warehouse inventory",
    long_about = "Listens to streaming and polled RFID readers, records every tag\n\
        sighting against the product catalog, supervises the listeners, and\n\
        keeps the PLC operator panel in sync with inventory totals.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "STOCKPULSE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ingestion daemon until interrupted
    Run(RunArgs),

    /// Process a scan batch against the catalog without any reader
    #[command(alias = "sim")]
    Simulate(SimulateArgs),

    /// Inspect and validate configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Don't start the listener supervisor
    #[arg(long)]
    pub no_supervise: bool,

    /// Exit if the PLC cannot be reached at startup
    #[arg(long)]
    pub require_plc: bool,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Reader the scan is attributed to
    pub reader_id: String,

    /// RFID tags in scan order
    #[arg(required = true, num_args = 1..)]
    pub tags: Vec<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the effective config (file + environment), secrets masked
    Show,

    /// Load and validate the config and catalog
    Validate,
}
