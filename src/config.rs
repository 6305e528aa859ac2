//! Configuration System
//!
//! Typed engine configuration loaded in layers: built-in defaults, the global
//! user file, workspace files, then `GENLOOM__SECTION__KEY` environment
//! variables. Every section rejects unknown keys so a typo fails the load
//! instead of being ignored.

use crate::logging::LoggingConfig;
use crate::retry::RetryConfig;
use crate::service::http::ServiceConfig;
use crate::service::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    /// Defaults forwarded to the generation service; plans may override.
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound on a single service call attempt (seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Save a checkpoint after this many jobs reach a terminal status
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Number of prior chain artifacts passed as context
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    300
}

fn default_checkpoint_every() -> usize {
    1
}

fn default_context_window() -> usize {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            checkpoint_every: default_checkpoint_every(),
            context_window: default_context_window(),
        }
    }
}

impl SchedulerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than zero".to_string());
        }
        if self.checkpoint_every == 0 {
            return Err("checkpoint_every must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Calls allowed per rolling window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_calls")]
    pub calls: u32,

    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
}

fn default_rate_calls() -> u32 {
    10
}

fn default_rate_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls: default_rate_calls(),
            window_secs: default_rate_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.calls == 0 {
            return Err("calls must be at least 1".to_string());
        }
        if self.window_secs == 0 {
            return Err("window_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Ceiling on the number of jobs a plan may expand to
    #[serde(default = "default_max_combinations")]
    pub max_combinations: u64,
}

fn default_max_combinations() -> u64 {
    crate::plan::DEFAULT_MAX_COMBINATIONS
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_combinations: default_max_combinations(),
        }
    }
}

/// Storage locations. Relative subpaths resolve against `root`, and a relative
/// `root` resolves against the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".genloom")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            cache_path: default_cache_path(),
            checkpoint_dir: default_checkpoint_dir(),
            artifact_dir: default_artifact_dir(),
            results_dir: default_results_dir(),
        }
    }
}

/// Absolute storage locations for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStorage {
    pub root: PathBuf,
    pub cache_path: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl StorageConfig {
    pub fn resolve(&self, workspace_root: &Path) -> ResolvedStorage {
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            workspace_root.join(&self.root)
        };
        let under_root = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                root.join(p)
            }
        };
        ResolvedStorage {
            cache_path: under_root(&self.cache_path),
            checkpoint_dir: under_root(&self.checkpoint_dir),
            artifact_dir: under_root(&self.artifact_dir),
            results_dir: under_root(&self.results_dir),
            root,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, path) in [
            ("root", &self.root),
            ("cache_path", &self.cache_path),
            ("checkpoint_dir", &self.checkpoint_dir),
            ("artifact_dir", &self.artifact_dir),
            ("results_dir", &self.results_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Scheduler(String),
    RateLimit(String),
    Retry(String),
    Planner(String),
    Generation(String),
    Service(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Scheduler(msg) => write!(f, "scheduler: {}", msg),
            ValidationError::RateLimit(msg) => write!(f, "rate_limit: {}", msg),
            ValidationError::Retry(msg) => write!(f, "retry: {}", msg),
            ValidationError::Planner(msg) => write!(f, "planner: {}", msg),
            ValidationError::Generation(msg) => write!(f, "generation: {}", msg),
            ValidationError::Service(msg) => write!(f, "service: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.scheduler.validate() {
            errors.push(ValidationError::Scheduler(e));
        }
        if let Err(e) = self.rate_limit.validate() {
            errors.push(ValidationError::RateLimit(e));
        }
        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }
        if self.planner.max_combinations == 0 {
            errors.push(ValidationError::Planner(
                "max_combinations must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.generation.validate() {
            errors.push(ValidationError::Generation(e));
        }
        if let Err(e) = self.service.validate() {
            errors.push(ValidationError::Service(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
