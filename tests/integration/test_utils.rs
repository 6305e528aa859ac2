//! Shared test utilities for integration tests
//!
//! A scripted generation service that records every call, and helpers to
//! open an engine on a temporary workspace.

use async_trait::async_trait;
use genloom::artifact::ArtifactStore;
use genloom::config::{EngineConfig, StorageConfig};
use genloom::engine::Engine;
use genloom::error::{ServiceError, ServiceErrorKind};
use genloom::plan::PlanInput;
use genloom::service::{GenerationRequest, GenerationService};
use genloom::types::ArtifactRef;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

/// One observed call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub prompt: String,
    pub context: Vec<ArtifactRef>,
    pub started: Instant,
}

/// Generation service with scripted failures, latency and call accounting.
pub struct ScriptedService {
    artifacts: Arc<ArtifactStore>,
    latency: Duration,
    /// Per-prompt errors returned, in order, before calls start succeeding.
    failures: Mutex<HashMap<String, VecDeque<ServiceError>>>,
    /// Returned for every call when set.
    always_fail: Option<ServiceError>,
    calls: Mutex<Vec<CallRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            artifacts,
            latency: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            always_fail: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn always_failing(mut self, error: ServiceError) -> Self {
        self.always_fail = Some(error);
        self
    }

    /// Fail calls for `prompt` with `errors`, one per call, then succeed.
    pub fn fail_prompt(self, prompt: &str, errors: Vec<ServiceError>) -> Self {
        self.failures
            .lock()
            .insert(prompt.to_string(), errors.into_iter().collect());
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, prompt: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.prompt == prompt).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(&self, request: GenerationRequest) -> Result<ArtifactRef, ServiceError> {
        self.calls.lock().push(CallRecord {
            prompt: request.prompt.clone(),
            context: request.context.clone(),
            started: Instant::now(),
        });
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .failures
            .lock()
            .get_mut(&request.prompt)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }

        let mut body = format!("artifact for {}", request.prompt);
        for reference in &request.context {
            body.push_str(&format!("\n<- {}", reference));
        }
        self.artifacts
            .put(body.as_bytes())
            .map_err(|e| ServiceError::new(ServiceErrorKind::Other, e.to_string()))
    }

    fn service_name(&self) -> &str {
        "scripted"
    }
}

pub fn transient(message: &str) -> ServiceError {
    ServiceError::new(ServiceErrorKind::Unavailable, message)
}

/// Open an engine rooted in `dir` with a fast retry schedule.
pub fn test_engine(dir: &TempDir, tweak: impl FnOnce(&mut EngineConfig)) -> Engine {
    let mut config = EngineConfig {
        storage: StorageConfig {
            root: dir.path().join("store"),
            ..StorageConfig::default()
        },
        ..EngineConfig::default()
    };
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1_000;
    config.rate_limit.calls = 100;
    config.rate_limit.window_secs = 1;
    tweak(&mut config);
    Engine::open(config, dir.path()).unwrap()
}

pub fn plan(text: &str) -> PlanInput {
    PlanInput::from_toml_str(text).unwrap()
}
