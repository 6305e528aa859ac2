//! CLI route: single route table and run context. Dispatches to the engine and presentation.

use crate::cli::parse::{CacheCommands, Commands};
use crate::cli::presentation::{
    format_cache_stats_text, format_plan_json, format_plan_text, format_run_summary,
    format_sessions_text, format_status_json, format_status_text,
};
use crate::cli::command_name;
use crate::config::ConfigLoader;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::plan::PlanInput;
use crate::report::build_session_report;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SECS_PER_DAY: u64 = 86_400;

/// Runtime context for CLI execution: workspace and the engine opened on it.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    engine: Engine,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, EngineError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        let engine = Engine::open(config, &workspace_root)?;
        Ok(Self {
            engine,
            workspace_root,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, EngineError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command);
        info!(
            command = %name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, EngineError> {
        match command {
            Commands::Plan { file, format } => self.handle_plan(file, format),
            Commands::Run {
                file,
                session_id,
                mock,
                fresh,
            } => self.handle_run(file, session_id.as_deref(), *mock, *fresh),
            Commands::Status { session_id, format } => self.handle_status(session_id, format),
            Commands::Report { session_id, format } => self.handle_report(session_id, format),
            Commands::Cache { command } => match command {
                CacheCommands::Stats { format } => self.handle_cache_stats(format),
                CacheCommands::Prune {
                    max_age_days,
                    max_entries,
                } => self.handle_cache_prune(*max_age_days, *max_entries),
            },
            Commands::Sessions { format } => self.handle_sessions(format),
        }
    }

    fn load_plan(&self, file: &Path) -> Result<(PlanInput, String), EngineError> {
        let path = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.workspace_root.join(file)
        };
        let input = PlanInput::load(&path)?;
        Ok((input, file.display().to_string()))
    }

    fn handle_plan(&self, file: &Path, format: &str) -> Result<String, EngineError> {
        let (input, source) = self.load_plan(file)?;
        let session = self.engine.plan(&input, &source)?;
        let checkpoint_exists = self.engine.checkpoints().exists(&session.id);
        match format {
            "json" => format_plan_json(&session, checkpoint_exists).map_err(to_output_error),
            "text" => Ok(format_plan_text(&session, checkpoint_exists)),
            other => Err(invalid_format(other, &["text", "json"])),
        }
    }

    fn handle_run(
        &self,
        file: &Path,
        session_id: Option<&str>,
        mock: bool,
        fresh: bool,
    ) -> Result<String, EngineError> {
        let (input, source) = self.load_plan(file)?;

        let prepared = match self.engine.prepare(&input, &source, session_id, fresh) {
            Err(EngineError::CheckpointCorruption { session_id, reason }) => {
                if !confirm_fresh_start(&session_id, &reason)? {
                    return Err(EngineError::CheckpointCorruption { session_id, reason });
                }
                self.engine.prepare(&input, &source, Some(&session_id), true)?
            }
            other => other?,
        };
        let resumed = prepared.resumed;
        let session_id = prepared.session.id.clone();
        let service = self.engine.service(mock)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let outcome = runtime.block_on(async {
            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            let signal_task = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; waiting for in-flight calls to finish");
                    signal_cancel.cancel();
                }
            });
            let result = self.engine.run(prepared.session, service, cancel).await;
            signal_task.abort();
            result
        })?;

        let summary = format_run_summary(&outcome, resumed, &self.engine.results_path(&session_id));
        if outcome.cancelled {
            println!("{}", summary);
            return Err(EngineError::Cancelled(session_id));
        }
        Ok(summary)
    }

    fn handle_status(&self, session_id: &str, format: &str) -> Result<String, EngineError> {
        let session = self.engine.load_session(session_id)?;
        match format {
            "json" => format_status_json(&session).map_err(to_output_error),
            "text" => Ok(format_status_text(&session)),
            other => Err(invalid_format(other, &["text", "json"])),
        }
    }

    fn handle_report(&self, session_id: &str, format: &str) -> Result<String, EngineError> {
        let session = self.engine.load_session(session_id)?;
        let report = build_session_report(&session, Some(self.engine.artifacts()));
        match format {
            "json" => report.to_json().map_err(to_output_error),
            "markdown" | "md" => Ok(report.to_markdown()),
            "text" => Ok(report.to_text()),
            other => Err(invalid_format(other, &["text", "json", "markdown"])),
        }
    }

    fn handle_cache_stats(&self, format: &str) -> Result<String, EngineError> {
        let stats = self.engine.cache().stats()?;
        match format {
            "json" => serde_json::to_string_pretty(&stats).map_err(to_output_error),
            "text" => Ok(format_cache_stats_text(&stats)),
            other => Err(invalid_format(other, &["text", "json"])),
        }
    }

    fn handle_cache_prune(
        &self,
        max_age_days: Option<u64>,
        max_entries: Option<usize>,
    ) -> Result<String, EngineError> {
        if max_age_days.is_none() && max_entries.is_none() {
            return Err(EngineError::Config(
                "cache prune needs --max-age-days or --max-entries".to_string(),
            ));
        }
        let max_age = max_age_days.map(|days| Duration::from_secs(days.saturating_mul(SECS_PER_DAY)));
        let cache = self.engine.cache();
        let removed = cache.prune(max_age, max_entries, Utc::now())?;
        cache.flush()?;
        Ok(format!(
            "Pruned {} cache entries; {} remain.",
            removed,
            cache.len()
        ))
    }

    fn handle_sessions(&self, format: &str) -> Result<String, EngineError> {
        let entries = self.engine.checkpoints().list()?;
        match format {
            "json" => serde_json::to_string_pretty(&entries).map_err(to_output_error),
            "text" => Ok(format_sessions_text(&entries)),
            other => Err(invalid_format(other, &["text", "json"])),
        }
    }
}

/// Ask before setting a corrupt checkpoint aside.
fn confirm_fresh_start(session_id: &str, reason: &str) -> Result<bool, EngineError> {
    use dialoguer::Confirm;
    eprintln!("Checkpoint for session '{}' is corrupt: {}", session_id, reason);
    Confirm::new()
        .with_prompt("Set it aside and start the session over?")
        .default(false)
        .interact()
        .map_err(|e| EngineError::Config(format!("Failed to get user input: {}", e)))
}

fn invalid_format(format: &str, allowed: &[&str]) -> EngineError {
    EngineError::Config(format!(
        "Invalid format '{}' (expected one of: {})",
        format,
        allowed.join(", ")
    ))
}

fn to_output_error(e: serde_json::Error) -> EngineError {
    EngineError::Storage(e.into())
}
