//! Mock generation service that produces placeholder artifacts without network calls.

use crate::artifact::ArtifactStore;
use crate::error::{ServiceError, ServiceErrorKind};
use crate::service::{GenerationRequest, GenerationService};
use crate::types::ArtifactRef;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Writes a deterministic text placeholder for every request.
///
/// The same prompt, context and config always yield the same artifact.
pub struct MockGenerationService {
    artifacts: Arc<ArtifactStore>,
    latency: Duration,
    calls: AtomicUsize,
}

impl MockGenerationService {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        info!("Using MOCK generation service - no external calls will be made");
        Self {
            artifacts,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulate service latency on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn render(request: &GenerationRequest) -> Vec<u8> {
        let mut body = String::from("MOCK ARTIFACT\n");
        body.push_str(&format!("prompt: {}\n", request.prompt));
        body.push_str(&format!(
            "size: {}x{} quality={} model={}\n",
            request.config.width,
            request.config.height,
            request.config.quality,
            request.config.model_id
        ));
        for (index, reference) in request.context.iter().enumerate() {
            body.push_str(&format!("context[{}]: {}\n", index, reference));
        }
        body.into_bytes()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn generate(&self, request: GenerationRequest) -> Result<ArtifactRef, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.artifacts.put(&Self::render(&request)).map_err(|e| {
            ServiceError::new(
                ServiceErrorKind::Other,
                format!("Failed to store mock artifact: {}", e),
            )
        })
    }

    fn service_name(&self) -> &str {
        "mock"
    }
}
