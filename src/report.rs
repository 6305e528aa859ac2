//! Session report data and rendering.
//!
//! Built from a session snapshot. Rendered as JSON, a terminal table, or a
//! Markdown history document. Failed jobs are always listed with their last
//! error, whether or not the session finished.

use crate::artifact::ArtifactStore;
use crate::error::ServiceError;
use crate::job::{Job, JobStatus};
use crate::session::{Session, SessionCounts};
use crate::types::{ArtifactRef, JobId};
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

/// Prompts longer than this are cut in the terminal table.
const TABLE_PROMPT_WIDTH: usize = 48;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub name: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
    pub complete: bool,
    pub counts: SessionCounts,
    /// Jobs that reached a terminal status, in completion order.
    pub jobs: Vec<JobReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u32>,
    pub status: JobStatus,
    pub attempts: u32,
    pub bindings: IndexMap<String, String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<ArtifactRef>,
    /// On-disk location when the artifact is held locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
}

impl JobReport {
    fn from_job(job: &Job, artifacts: Option<&ArtifactStore>) -> Self {
        let artifact_path = match (artifacts, &job.artifact_ref) {
            (Some(store), Some(reference)) => store
                .path_of(reference)
                .filter(|path| path.exists())
                .map(|path| path.display().to_string()),
            _ => None,
        };
        Self {
            job_id: job.id,
            chain: job.chain.clone(),
            sequence_index: job.sequence_index,
            status: job.status,
            attempts: job.attempts,
            bindings: job.bindings.clone(),
            prompt: job.prompt.clone(),
            artifact_ref: job.artifact_ref.clone(),
            artifact_path,
            completed_at: job.completed_at,
            duration_ms: job.duration_ms(),
            error: job.last_error.clone(),
        }
    }

    /// Short label: bindings for batch jobs, `chain#index` for chain steps.
    fn label(&self) -> String {
        match (&self.chain, self.sequence_index) {
            (Some(chain), Some(index)) => format!("{}#{}", chain, index),
            _ if self.bindings.is_empty() => "-".to_string(),
            _ => self
                .bindings
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Build a report from a session. Pass the artifact store to resolve local
/// artifact paths.
pub fn build_session_report(session: &Session, artifacts: Option<&ArtifactStore>) -> SessionReport {
    let mut counts = session.counts.clone();
    if counts.total != session.jobs.len() {
        let mut copy = session.clone();
        copy.recount();
        counts = copy.counts;
    }

    let mut finished: Vec<&Job> = session
        .jobs
        .iter()
        .filter(|job| job.status.is_terminal())
        .collect();
    finished.sort_by_key(|job| (job.completed_at, job.id));

    SessionReport {
        session_id: session.id.clone(),
        name: session.name.clone(),
        source: session.source.clone(),
        template: session.source_template.clone(),
        started_at: session.started_at,
        ended_at: session.ended_at,
        duration_secs: session
            .ended_at
            .map(|end| end.signed_duration_since(session.started_at).num_seconds()),
        complete: session.is_complete(),
        counts,
        jobs: finished
            .into_iter()
            .map(|job| JobReport::from_job(job, artifacts))
            .collect(),
    }
}

impl SessionReport {
    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::FailedTerminal)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Terminal rendering with styled headings and comfy-table tables.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{}\n\n",
            format_section_heading(&format!("Session {}", self.name))
        ));
        out.push_str(&format!("  Id: {}\n", self.session_id));
        out.push_str(&format!("  Source: {}\n", self.source));
        out.push_str(&format!("  Started: {}\n", self.started_at.to_rfc3339()));
        match self.ended_at {
            Some(ended) => out.push_str(&format!("  Ended: {}\n", ended.to_rfc3339())),
            None => out.push_str("  Ended: (incomplete)\n"),
        }
        out.push('\n');

        out.push_str(&format!("{}\n\n", format_section_heading("Counts")));
        out.push_str(&format!("{}\n\n", counts_table(&self.counts)));

        if !self.jobs.is_empty() {
            out.push_str(&format!("{}\n\n", format_section_heading("Jobs")));
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Job", "Item", "Status", "Attempts", "Prompt", "Artifact"]);
            for job in &self.jobs {
                table.add_row(vec![
                    job.job_id.to_string(),
                    job.label(),
                    job.status.as_str().to_string(),
                    job.attempts.to_string(),
                    truncate(&job.prompt, TABLE_PROMPT_WIDTH),
                    job.artifact_ref
                        .as_ref()
                        .map(|a| truncate(a.as_str(), 20))
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            out.push_str(&format!("{}\n\n", table));
        }

        let failed: Vec<&JobReport> = self.failed().collect();
        if !failed.is_empty() {
            out.push_str(&format!("{}\n\n", format_section_heading("Failed jobs")));
            for job in failed {
                let error = job
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                out.push_str(&format!("  {} ({}): {}\n", job.job_id, job.label(), error.red()));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "Total: {} jobs, {} succeeded, {} cached, {} failed, {} pending.\n",
            self.counts.total,
            self.counts.succeeded,
            self.counts.cached,
            self.counts.failed,
            self.counts.pending
        ));
        out
    }

    /// Markdown history document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.name));
        out.push_str(&format!("- **Session:** `{}`\n", self.session_id));
        out.push_str(&format!("- **Source:** {}\n", self.source));
        out.push_str(&format!("- **Started:** {}\n", self.started_at.to_rfc3339()));
        if let Some(ended) = self.ended_at {
            out.push_str(&format!("- **Ended:** {}\n", ended.to_rfc3339()));
        }
        if let Some(secs) = self.duration_secs {
            out.push_str(&format!("- **Duration:** {}s\n", secs));
        }
        if !self.complete {
            out.push_str("- **State:** incomplete\n");
        }
        if let Some(template) = &self.template {
            out.push_str(&format!("\n**Template:** `{}`\n", template));
        }

        out.push_str("\n## Summary\n\n");
        out.push_str("| Total | Succeeded | Cached | Failed | Pending | Calls |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            self.counts.total,
            self.counts.succeeded,
            self.counts.cached,
            self.counts.failed,
            self.counts.pending,
            self.counts.calls
        ));

        if !self.jobs.is_empty() {
            out.push_str("\n## Jobs\n");
            for job in &self.jobs {
                out.push_str(&format!(
                    "\n### {} ({})\n\n",
                    job.job_id,
                    job.status.as_str()
                ));
                if let (Some(chain), Some(index)) = (&job.chain, job.sequence_index) {
                    out.push_str(&format!("- **Chain:** {} step {}\n", chain, index));
                }
                for (name, value) in &job.bindings {
                    out.push_str(&format!("- **{}:** {}\n", name, value));
                }
                out.push_str(&format!("- **Attempts:** {}\n", job.attempts));
                if let Some(artifact) = &job.artifact_ref {
                    match &job.artifact_path {
                        Some(path) => {
                            out.push_str(&format!("- **Artifact:** `{}` ({})\n", artifact, path))
                        }
                        None => out.push_str(&format!("- **Artifact:** `{}`\n", artifact)),
                    }
                }
                if let Some(ms) = job.duration_ms {
                    out.push_str(&format!("- **Time:** {} ms\n", ms));
                }
                if let Some(error) = &job.error {
                    if job.status == JobStatus::FailedTerminal {
                        out.push_str(&format!("- **Error:** {}\n", error));
                    }
                }
                out.push_str(&format!("\n> {}\n", job.prompt.replace('\n', "\n> ")));
            }
        }
        out
    }
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn counts_table(counts: &SessionCounts) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Total", "Succeeded", "Cached", "Failed", "Pending", "Calls"]);
    table.add_row(vec![
        counts.total.to_string(),
        counts.succeeded.to_string(),
        counts.cached.to_string(),
        counts.failed.to_string(),
        counts.pending.to_string(),
        counts.calls.to_string(),
    ]);
    table
}

pub fn truncate(text: &str, width: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= width {
        return flat;
    }
    let cut: String = flat.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}
