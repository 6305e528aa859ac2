//! Job planning: plan input → session with a full, deterministic job list.

use crate::error::PlanningError;
use crate::fingerprint::{compute_content_key, context_fingerprint};
use crate::job::Job;
use crate::plan::input::PlanInput;
use crate::plan::sampler::{dedup_domains, Bindings, CombinationSpace};
use crate::plan::template;
use crate::service::GenerationConfig;
use crate::session::{SamplingMode, Session, SessionCounts, SessionSettings};
use crate::types::JobId;
use chrono::Utc;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info};

/// Default ceiling on materialized combinations.
pub const DEFAULT_MAX_COMBINATIONS: u64 = 10_000;

/// Expands templates and chains into jobs.
#[derive(Debug, Clone)]
pub struct JobPlanner {
    max_combinations: u64,
    generation: GenerationConfig,
}

impl JobPlanner {
    pub fn new(max_combinations: u64, generation: GenerationConfig) -> Self {
        Self {
            max_combinations,
            generation,
        }
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Combinations for a template, in job order.
    ///
    /// The combination count is checked against the ceiling from domain sizes
    /// before anything is materialized.
    pub fn combinations(
        &self,
        template: &str,
        domains: &IndexMap<String, Vec<String>>,
        sampling: &SamplingMode,
    ) -> Result<Vec<Bindings>, PlanningError> {
        template::validate(template, domains)?;
        let space = CombinationSpace::new(domains);
        let total = space.size();

        match sampling {
            SamplingMode::All => self.all(&space, total),
            SamplingMode::Random { seed, count } => {
                if *count == 0 {
                    return Err(PlanningError::Invalid(
                        "random sampling count must be at least 1".to_string(),
                    ));
                }
                if *count as u128 >= total {
                    info!(
                        requested = count,
                        total = %total,
                        "Requested count covers the whole space; generating all combinations"
                    );
                    return self.all(&space, total);
                }
                self.check_ceiling(*count as u128)?;
                info!(seed, count, total = %total, "Sampling random combinations");
                space.sample(*seed, *count)
            }
            SamplingMode::First { count } => {
                if *count == 0 {
                    return Err(PlanningError::Invalid(
                        "first sampling count must be at least 1".to_string(),
                    ));
                }
                self.check_ceiling((*count as u128).min(total))?;
                Ok(space.first(*count))
            }
        }
    }

    fn all(&self, space: &CombinationSpace<'_>, total: u128) -> Result<Vec<Bindings>, PlanningError> {
        self.check_ceiling(total)?;
        info!(total = %total, "Generating all combinations");
        Ok(space.all())
    }

    fn check_ceiling(&self, total: u128) -> Result<(), PlanningError> {
        if total > self.max_combinations as u128 {
            return Err(PlanningError::TooManyCombinations {
                total,
                ceiling: self.max_combinations,
            });
        }
        Ok(())
    }

    /// Plan a full session. Independent jobs come first, then chain steps in
    /// declaration order; ids are assigned sequentially from 1.
    pub fn plan(
        &self,
        input: &PlanInput,
        source: &str,
        session_id: String,
        settings: SessionSettings,
    ) -> Result<Session, PlanningError> {
        if input.template.is_none() && input.chains.is_empty() {
            if !input.variables.is_empty() {
                return Err(PlanningError::Validation {
                    unknown: Vec::new(),
                    unused: input.variables.keys().cloned().collect(),
                });
            }
            return Err(PlanningError::Invalid(
                "plan declares neither a template nor chains".to_string(),
            ));
        }

        let now = Utc::now();
        let domains = dedup_domains(&input.variables);
        let empty_context = context_fingerprint(&[]);
        let mut jobs: Vec<Job> = Vec::new();
        let mut next_id = 1u32;

        if let Some(template_text) = &input.template {
            let combinations = self.combinations(template_text, &domains, &input.sampling)?;
            let mut seen = HashSet::with_capacity(combinations.len());
            for bindings in combinations {
                let prompt = template::render(template_text, &bindings);
                let key = compute_content_key(&prompt, &bindings, &empty_context, &self.generation);
                if !seen.insert(key) {
                    debug!(prompt = %prompt, "Skipping combination with duplicate content key");
                    continue;
                }
                jobs.push(Job::independent(JobId::new(next_id), prompt, bindings, key, now));
                next_id += 1;
            }
        } else if !input.variables.is_empty() {
            return Err(PlanningError::Validation {
                unknown: Vec::new(),
                unused: input.variables.keys().cloned().collect(),
            });
        }

        let mut chain_names = HashSet::new();
        for chain in &input.chains {
            if !chain_names.insert(chain.name.as_str()) {
                return Err(PlanningError::DuplicateChain(chain.name.clone()));
            }
            if chain.steps.is_empty() {
                return Err(PlanningError::Invalid(format!(
                    "chain '{}' has no steps",
                    chain.name
                )));
            }
            for (index, step) in chain.steps.iter().enumerate() {
                if step.trim().is_empty() {
                    return Err(PlanningError::Invalid(format!(
                        "chain '{}' step {} has an empty prompt",
                        chain.name, index
                    )));
                }
                jobs.push(Job::chained(
                    JobId::new(next_id),
                    chain.name.clone(),
                    index as u32,
                    step.clone(),
                    now,
                ));
                next_id += 1;
            }
        }

        let mut session = Session {
            id: session_id,
            name: input.name.clone(),
            source: source.to_string(),
            source_template: input.template.clone(),
            variable_domains: domains,
            settings,
            generation: self.generation.clone(),
            jobs,
            started_at: now,
            ended_at: None,
            counts: SessionCounts::default(),
        };
        session.recount();
        info!(
            session_id = %session.id,
            jobs = session.jobs.len(),
            chains = input.chains.len(),
            "Planned session"
        );
        Ok(session)
    }
}

/// Stable session id for a plan: `{slug}-{digest}`.
///
/// The digest covers the plan input and the generation config, so running
/// the same plan again finds the same checkpoint.
pub fn derive_session_id(
    input: &PlanInput,
    generation: &GenerationConfig,
) -> Result<String, PlanningError> {
    let mut hasher = blake3::Hasher::new();
    let plan_bytes =
        serde_json::to_vec(input).map_err(|e| PlanningError::Invalid(e.to_string()))?;
    let config_bytes =
        serde_json::to_vec(generation).map_err(|e| PlanningError::Invalid(e.to_string()))?;
    hasher.update(&(plan_bytes.len() as u64).to_be_bytes());
    hasher.update(&plan_bytes);
    hasher.update(&config_bytes);
    let digest = hasher.finalize();
    Ok(format!("{}-{}", slug(&input.name), &digest.to_hex()[..12]))
}

fn slug(name: &str) -> String {
    let mut out = String::new();
    let mut dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "session".to_string()
    } else {
        out
    }
}
