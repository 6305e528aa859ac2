//! Session model: a full run of planned jobs sharing a template and settings.

use crate::job::{Job, JobStatus};
use crate::service::GenerationConfig;
use crate::types::JobId;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How combinations are drawn from the variable domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum SamplingMode {
    /// Full Cartesian product.
    All,
    /// `count` distinct combinations drawn deterministically from `seed`.
    Random { seed: u64, count: usize },
    /// First `count` combinations of the Cartesian enumeration.
    First { count: usize },
}

impl Default for SamplingMode {
    fn default() -> Self {
        SamplingMode::All
    }
}

/// Effective settings a session was planned and run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub max_concurrency: usize,
    pub rate_limit_calls: u32,
    pub rate_limit_window_secs: u64,
    pub max_retries: u32,
    pub context_window: usize,
    pub sampling: SamplingMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub total: usize,
    /// Jobs that made at least one service call.
    pub attempted: usize,
    pub succeeded: usize,
    pub cached: usize,
    pub failed: usize,
    pub pending: usize,
    /// Service calls across all jobs.
    pub calls: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    /// Where the plan came from (file path or label).
    pub source: String,
    #[serde(default)]
    pub source_template: Option<String>,
    #[serde(default)]
    pub variable_domains: IndexMap<String, Vec<String>>,
    pub settings: SessionSettings,
    /// Output settings every job key and call is computed with.
    pub generation: GenerationConfig,
    pub jobs: Vec<Job>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub counts: SessionCounts,
}

impl Session {
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    /// Every job has reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|job| job.status.is_terminal())
    }

    pub fn recount(&mut self) {
        let mut counts = SessionCounts {
            total: self.jobs.len(),
            ..SessionCounts::default()
        };
        for job in &self.jobs {
            if job.attempts > 0 {
                counts.attempted += 1;
            }
            counts.calls += u64::from(job.attempts);
            match job.status {
                JobStatus::Succeeded => counts.succeeded += 1,
                JobStatus::Cached => counts.cached += 1,
                JobStatus::FailedTerminal => counts.failed += 1,
                JobStatus::Pending | JobStatus::Running | JobStatus::FailedRetryable => {
                    counts.pending += 1
                }
            }
        }
        self.counts = counts;
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::FailedTerminal)
    }

    /// Independent jobs, in planning order.
    pub fn independent_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|job| !job.is_chained())
    }

    /// Job ids per chain, ordered by sequence index. Chains keep declaration order.
    pub fn chains(&self) -> IndexMap<String, Vec<JobId>> {
        let mut chains: IndexMap<String, BTreeMap<u32, JobId>> = IndexMap::new();
        for job in &self.jobs {
            if let (Some(chain), Some(index)) = (&job.chain, job.sequence_index) {
                chains
                    .entry(chain.clone())
                    .or_default()
                    .insert(index, job.id);
            }
        }
        chains
            .into_iter()
            .map(|(name, steps)| (name, steps.into_values().collect()))
            .collect()
    }

    /// Normalize statuses for a resumed run.
    ///
    /// `Running` only exists at rest after a crash; such jobs go back to
    /// `Pending` with their attempts kept. Returns the number of jobs left to run.
    pub fn prepare_for_resume(&mut self) -> usize {
        let mut remaining = 0;
        for job in &mut self.jobs {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
            }
            if !job.status.is_terminal() {
                remaining += 1;
            }
        }
        self.ended_at = None;
        self.recount();
        remaining
    }

    /// Copy suitable for persisting: no job is left marked `Running`.
    pub fn snapshot(&self) -> Session {
        let mut snapshot = self.clone();
        for job in &mut snapshot.jobs {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
            }
        }
        snapshot.recount();
        snapshot
    }

    /// Check structural invariants: unique ids, chain fields set together,
    /// and contiguous sequence indices starting at zero per chain.
    pub fn verify_structure(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        let mut indices: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for job in &self.jobs {
            if !seen.insert(job.id) {
                return Err(format!("duplicate job id {}", job.id));
            }
            match (&job.chain, job.sequence_index) {
                (Some(chain), Some(index)) => indices.entry(chain).or_default().push(index),
                (None, None) => {}
                _ => {
                    return Err(format!(
                        "job {} has a chain without a sequence index or vice versa",
                        job.id
                    ))
                }
            }
            if job.status.is_success() && job.artifact_ref.is_none() {
                return Err(format!("job {} is {:?} without an artifact", job.id, job.status));
            }
        }
        for (chain, mut list) in indices {
            list.sort_unstable();
            for (expected, actual) in list.iter().enumerate() {
                if *actual as usize != expected {
                    return Err(format!(
                        "chain '{}' sequence indices are not contiguous (expected {}, found {})",
                        chain, expected, actual
                    ));
                }
            }
        }
        Ok(())
    }
}
