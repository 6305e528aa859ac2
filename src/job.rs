//! Job model and its status state machine.
//!
//! `Pending → Running → {Succeeded | Cached | FailedRetryable → Running | FailedTerminal}`
//!
//! `Succeeded`, `Cached` and `FailedTerminal` are terminal: once reached, a job
//! never transitions again.

use crate::error::ServiceError;
use crate::types::{ArtifactRef, ContentKey, JobId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Cached,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Cached => "cached",
            JobStatus::Succeeded => "succeeded",
            JobStatus::FailedRetryable => "failed_retryable",
            JobStatus::FailedTerminal => "failed_terminal",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cached | JobStatus::Succeeded | JobStatus::FailedTerminal
        )
    }

    /// Terminal with a usable artifact.
    pub fn is_success(self) -> bool {
        matches!(self, JobStatus::Cached | JobStatus::Succeeded)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cached) | (Pending, FailedTerminal) => true,
            (Running, Succeeded)
            | (Running, FailedRetryable)
            | (Running, FailedTerminal)
            | (Running, Pending) => true,
            (FailedRetryable, Running)
            | (FailedRetryable, Cached)
            | (FailedRetryable, FailedTerminal) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Job {job} cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub job: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A unit of generation work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Dependent chain this job belongs to; `None` for independent batch jobs.
    #[serde(default)]
    pub chain: Option<String>,
    /// Position in the chain; `None` for independent batch jobs.
    #[serde(default)]
    pub sequence_index: Option<u32>,
    pub prompt: String,
    #[serde(default)]
    pub bindings: IndexMap<String, String>,
    /// Context window handed to the service; empty for independent jobs.
    #[serde(default)]
    pub context_ref: Vec<ArtifactRef>,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(default, with = "crate::types::opt_key_hex")]
    pub content_key: Option<ContentKey>,
    #[serde(default)]
    pub artifact_ref: Option<ArtifactRef>,
    #[serde(default)]
    pub last_error: Option<ServiceError>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Independent batch job.
    pub fn independent(
        id: JobId,
        prompt: String,
        bindings: IndexMap<String, String>,
        content_key: ContentKey,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            chain: None,
            sequence_index: None,
            prompt,
            bindings,
            context_ref: Vec::new(),
            status: JobStatus::Pending,
            attempts: 0,
            content_key: Some(content_key),
            artifact_ref: None,
            last_error: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Step of a dependent chain. Its content key is fixed once its context is known.
    pub fn chained(
        id: JobId,
        chain: String,
        sequence_index: u32,
        prompt: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            chain: Some(chain),
            sequence_index: Some(sequence_index),
            prompt,
            bindings: IndexMap::new(),
            context_ref: Vec::new(),
            status: JobStatus::Pending,
            attempts: 0,
            content_key: None,
            artifact_ref: None,
            last_error: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_chained(&self) -> bool {
        self.chain.is_some()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                job: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Start a call attempt. Every attempt counts, whatever its outcome.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Running)?;
        self.attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        Ok(())
    }

    pub fn succeed(
        &mut self,
        artifact: ArtifactRef,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Succeeded)?;
        self.artifact_ref = Some(artifact);
        self.last_error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn serve_from_cache(
        &mut self,
        artifact: ArtifactRef,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Cached)?;
        self.artifact_ref = Some(artifact);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(
        &mut self,
        error: ServiceError,
        terminal: bool,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let next = if terminal {
            JobStatus::FailedTerminal
        } else {
            JobStatus::FailedRetryable
        };
        self.transition(next)?;
        self.last_error = Some(error);
        if terminal {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Close out a job whose retry budget is already spent without another call.
    ///
    /// A job restored as `Pending` after an interrupted final attempt lands
    /// here too.
    pub fn exhaust(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::FailedTerminal)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Undo a `Running` mark for a call that never reached the service.
    /// Attempts are kept so retry budgets hold across interruptions.
    pub fn revert_to_pending(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Pending)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
