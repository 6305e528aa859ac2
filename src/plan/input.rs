//! Plan files: the declared generation requests a session is planned from.
//!
//! ```toml
//! name = "hero-variations"
//! template = "A {style} portrait of {subject}"
//!
//! [variables]
//! style = ["ink", "watercolor"]
//! subject = ["a knight", "a fox"]
//!
//! [sampling]
//! mode = "random"
//! seed = 42
//! count = 3
//!
//! [[chains]]
//! name = "chapter-1"
//! steps = ["Page 1: the gate", "Page 2: the courtyard"]
//!
//! [overrides]
//! max_concurrency = 2
//! ```

use crate::error::PlanningError;
use crate::service::GenerationConfig;
use crate::session::{SamplingMode, SessionSettings};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanInput {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Prompt template with `{variable}` placeholders.
    #[serde(default)]
    pub template: Option<String>,

    /// Variable domains in declaration order.
    #[serde(default)]
    pub variables: IndexMap<String, Vec<String>>,

    #[serde(default)]
    pub sampling: SamplingMode,

    /// Dependent page sequences.
    #[serde(default)]
    pub chains: Vec<ChainInput>,

    #[serde(default)]
    pub overrides: PlanOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainInput {
    pub name: String,
    pub steps: Vec<String>,
}

/// Per-plan replacements for configured settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanOverrides {
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub rate_limit_calls: Option<u32>,
    #[serde(default)]
    pub rate_limit_window_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub context_window: Option<usize>,
    #[serde(default)]
    pub max_combinations: Option<u64>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl PlanOverrides {
    pub fn apply_settings(&self, settings: &mut SessionSettings) {
        if let Some(value) = self.max_concurrency {
            settings.max_concurrency = value;
        }
        if let Some(value) = self.rate_limit_calls {
            settings.rate_limit_calls = value;
        }
        if let Some(value) = self.rate_limit_window_secs {
            settings.rate_limit_window_secs = value;
        }
        if let Some(value) = self.max_retries {
            settings.max_retries = value;
        }
        if let Some(value) = self.context_window {
            settings.context_window = value;
        }
    }

    pub fn apply_generation(&self, generation: &mut GenerationConfig) {
        if let Some(value) = &self.quality {
            generation.quality = value.clone();
        }
        if let Some(value) = self.width {
            generation.width = value;
        }
        if let Some(value) = self.height {
            generation.height = value;
        }
        if let Some(value) = &self.model_id {
            generation.model_id = value.clone();
        }
    }
}

impl PlanInput {
    pub fn from_toml_str(text: &str) -> Result<Self, PlanningError> {
        let input: PlanInput =
            toml::from_str(text).map_err(|e| PlanningError::Invalid(e.to_string()))?;
        if input.name.trim().is_empty() {
            return Err(PlanningError::Invalid("plan name cannot be empty".to_string()));
        }
        Ok(input)
    }

    pub fn load(path: &Path) -> Result<Self, PlanningError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PlanningError::Invalid(format!("Failed to read plan file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}
