//! CLI command-name contract for logging and routing.

use crate::cli::parse::{CacheCommands, Commands};

/// Command name string for logs (e.g. "run", "cache.prune").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Plan { .. } => "plan".to_string(),
        Commands::Run { .. } => "run".to_string(),
        Commands::Status { .. } => "status".to_string(),
        Commands::Report { .. } => "report".to_string(),
        Commands::Cache { command } => format!("cache.{}", cache_command_name(command)),
        Commands::Sessions { .. } => "sessions".to_string(),
    }
}

pub fn cache_command_name(command: &CacheCommands) -> &'static str {
    match command {
        CacheCommands::Stats { .. } => "stats",
        CacheCommands::Prune { .. } => "prune",
    }
}
