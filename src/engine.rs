//! Engine façade
//!
//! Owns the durable stores for one workspace and wires planning, resume and
//! scheduling together. The CLI and tests talk to the engine rather than to
//! the individual components.

use crate::artifact::ArtifactStore;
use crate::cache::ArtifactCache;
use crate::checkpoint::CheckpointStore;
use crate::config::{EngineConfig, ResolvedStorage};
use crate::error::{EngineError, PlanningError};
use crate::plan::{derive_session_id, JobPlanner, PlanInput};
use crate::ratelimit::RateLimiter;
use crate::results::ResultLog;
use crate::retry::RetryPolicy;
use crate::scheduler::{RunOutcome, Scheduler, SchedulerOptions};
use crate::service::{GenerationConfig, GenerationService, HttpGenerationService, MockGenerationService};
use crate::session::{Session, SessionSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A session ready to run, and whether it came from a checkpoint.
#[derive(Debug)]
pub struct PreparedSession {
    pub session: Session,
    pub resumed: bool,
}

pub struct Engine {
    config: EngineConfig,
    storage: ResolvedStorage,
    artifacts: Arc<ArtifactStore>,
    cache: Arc<ArtifactCache>,
    checkpoints: Arc<CheckpointStore>,
}

impl Engine {
    /// Validate the configuration and open every store under the workspace.
    pub fn open(config: EngineConfig, workspace_root: &Path) -> Result<Self, EngineError> {
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::Config(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        let storage = config.storage.resolve(workspace_root);
        let artifacts = Arc::new(ArtifactStore::new(&storage.artifact_dir)?);
        let cache = Arc::new(ArtifactCache::open(&storage.cache_path)?);
        let checkpoints = Arc::new(CheckpointStore::new(&storage.checkpoint_dir)?);
        info!(root = %storage.root.display(), "Opened engine storage");
        Ok(Self {
            config,
            storage,
            artifacts,
            cache,
            checkpoints,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &ResolvedStorage {
        &self.storage
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn checkpoints(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    /// Effective settings for a plan: configured values with the plan's
    /// overrides applied. Returns the session settings, the generation config
    /// and the combination ceiling.
    pub fn settings_for(
        &self,
        input: &PlanInput,
    ) -> Result<(SessionSettings, GenerationConfig, u64), PlanningError> {
        let mut settings = SessionSettings {
            max_concurrency: self.config.scheduler.max_concurrency,
            rate_limit_calls: self.config.rate_limit.calls,
            rate_limit_window_secs: self.config.rate_limit.window_secs,
            max_retries: self.config.retry.max_retries,
            context_window: self.config.scheduler.context_window,
            sampling: input.sampling.clone(),
        };
        input.overrides.apply_settings(&mut settings);

        let mut generation = self.config.generation.clone();
        input.overrides.apply_generation(&mut generation);
        generation
            .validate()
            .map_err(|e| PlanningError::Invalid(format!("overrides: {}", e)))?;

        if settings.max_concurrency == 0 {
            return Err(PlanningError::Invalid(
                "overrides: max_concurrency must be at least 1".to_string(),
            ));
        }
        if settings.rate_limit_calls == 0 || settings.rate_limit_window_secs == 0 {
            return Err(PlanningError::Invalid(
                "overrides: rate limit calls and window must be non-zero".to_string(),
            ));
        }

        let max_combinations = input
            .overrides
            .max_combinations
            .unwrap_or(self.config.planner.max_combinations);
        Ok((settings, generation, max_combinations))
    }

    /// Plan a new session without touching storage.
    pub fn plan(&self, input: &PlanInput, source: &str) -> Result<Session, EngineError> {
        let (settings, generation, max_combinations) = self.settings_for(input)?;
        let session_id = derive_session_id(input, &generation)?;
        self.plan_with_id(input, source, session_id, settings, generation, max_combinations)
    }

    fn plan_with_id(
        &self,
        input: &PlanInput,
        source: &str,
        session_id: String,
        settings: SessionSettings,
        generation: GenerationConfig,
        max_combinations: u64,
    ) -> Result<Session, EngineError> {
        let planner = JobPlanner::new(max_combinations, generation);
        Ok(planner.plan(input, source, session_id, settings)?)
    }

    /// Resume the plan's checkpoint if one exists, otherwise plan fresh.
    ///
    /// A corrupt checkpoint is an error unless `fresh` is set, in which case
    /// it is set aside (never deleted) and planning starts over. `fresh` also
    /// sets aside a healthy checkpoint.
    pub fn prepare(
        &self,
        input: &PlanInput,
        source: &str,
        session_id: Option<&str>,
        fresh: bool,
    ) -> Result<PreparedSession, EngineError> {
        let (settings, generation, max_combinations) = self.settings_for(input)?;
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => derive_session_id(input, &generation)?,
        };

        if self.checkpoints.exists(&session_id) {
            if fresh {
                self.checkpoints.set_aside(&session_id)?;
                self.set_aside_results(&session_id)?;
            } else {
                let mut session = self.checkpoints.load(&session_id)?;
                let remaining = session.prepare_for_resume();
                info!(session_id = %session_id, remaining, "Resuming session from checkpoint");
                return Ok(PreparedSession {
                    session,
                    resumed: true,
                });
            }
        }

        let session = self.plan_with_id(
            input,
            source,
            session_id,
            settings,
            generation,
            max_combinations,
        )?;
        Ok(PreparedSession {
            session,
            resumed: false,
        })
    }

    pub fn load_session(&self, session_id: &str) -> Result<Session, EngineError> {
        self.checkpoints.load(session_id)
    }

    pub fn results_path(&self, session_id: &str) -> PathBuf {
        self.storage.results_dir.join(format!("{}.jsonl", session_id))
    }

    fn set_aside_results(&self, session_id: &str) -> Result<(), EngineError> {
        let path = self.results_path(session_id);
        if path.exists() {
            let aside = path.with_extension("jsonl.bak");
            fs::rename(&path, &aside)?;
            warn!(session_id, path = %aside.display(), "Result log set aside");
        }
        Ok(())
    }

    /// Service adapter for this engine: the mock, or HTTP per `[service]`.
    pub fn service(&self, mock: bool) -> Result<Arc<dyn GenerationService>, EngineError> {
        if mock {
            return Ok(Arc::new(MockGenerationService::new(Arc::clone(&self.artifacts))));
        }
        let service = HttpGenerationService::new(&self.config.service, Arc::clone(&self.artifacts))?;
        Ok(Arc::new(service))
    }

    /// Run a session to completion or cancellation. The final state is
    /// checkpointed either way.
    pub async fn run(
        &self,
        session: Session,
        service: Arc<dyn GenerationService>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let settings = session.settings.clone();
        let limiter = Arc::new(RateLimiter::new(
            settings.rate_limit_calls,
            Duration::from_secs(settings.rate_limit_window_secs),
        ));
        let retry = RetryPolicy::new(settings.max_retries, &self.config.retry);
        let results = Arc::new(ResultLog::open(self.results_path(&session.id))?);
        let options = SchedulerOptions {
            max_concurrency: settings.max_concurrency,
            call_timeout: self.config.scheduler.call_timeout(),
            checkpoint_every: self.config.scheduler.checkpoint_every,
            context_window: settings.context_window,
        };

        let scheduler = Scheduler::new(
            service,
            Arc::clone(&self.cache),
            Arc::clone(&self.checkpoints),
            results,
            limiter,
            retry,
            options,
        );
        let outcome = scheduler.run(session, cancel).await?;
        self.cache.flush()?;
        Ok(outcome)
    }
}
