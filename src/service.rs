//! Generation Service Abstraction
//!
//! The engine treats the generation service as an opaque, fallible black box:
//! a prompt plus an ordered list of context artifacts goes in, an artifact
//! reference or a classified error comes out. Adapters live in submodules.

use crate::error::ServiceError;
use crate::types::ArtifactRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod http;
pub mod mock;

pub use http::HttpGenerationService;
pub use mock::MockGenerationService;

/// Output settings forwarded to the service with every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

fn default_quality() -> String {
    "high".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    1536
}

fn default_model_id() -> String {
    "image-preview".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            width: default_width(),
            height: default_height(),
            model_id: default_model_id(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model_id.trim().is_empty() {
            return Err("model_id cannot be empty".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "dimensions must be non-zero (got {}x{})",
                self.width, self.height
            ));
        }
        Ok(())
    }
}

/// One call to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub context: Vec<ArtifactRef>,
    pub config: GenerationConfig,
}

/// Generation service adapter trait
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce one artifact for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<ArtifactRef, ServiceError>;

    /// Adapter name for logs and reports.
    fn service_name(&self) -> &str;
}
