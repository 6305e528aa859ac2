//! CLI parse: clap types for genloom. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// genloom CLI - batch generation with caching, rate limiting and resumable sessions
#[derive(Parser)]
#[command(name = "genloom")]
#[command(about = "Plan and run batches of generation jobs against a rate-limited service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Expand a plan file and list its jobs without calling the service
    Plan {
        /// Plan file (TOML)
        file: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Run a plan, resuming its checkpoint when one exists
    Run {
        /// Plan file (TOML)
        file: PathBuf,
        /// Use this session id instead of the one derived from the plan
        #[arg(long)]
        session_id: Option<String>,
        /// Use the mock service (no network calls)
        #[arg(long)]
        mock: bool,
        /// Set aside any existing checkpoint and start over
        #[arg(long)]
        fresh: bool,
    },
    /// Show progress of a checkpointed session
    Status {
        session_id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Render the report for a session
    Report {
        session_id: String,
        /// Output format (text, json or markdown)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Artifact cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// List checkpointed sessions
    Sessions {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache size and hit totals
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove old entries
    Prune {
        /// Remove entries older than this many days
        #[arg(long)]
        max_age_days: Option<u64>,
        /// Keep at most this many entries, newest first
        #[arg(long)]
        max_entries: Option<usize>,
    },
}
