//! CLI presentation: text and json formatters per command family.

use crate::cache::CacheStats;
use crate::checkpoint::CheckpointSummary;
use crate::report::{counts_table, format_section_heading, truncate};
use crate::scheduler::RunOutcome;
use crate::session::Session;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;
use std::path::Path;

const PLAN_PROMPT_WIDTH: usize = 60;

fn job_label(job: &crate::job::Job) -> String {
    match (&job.chain, job.sequence_index) {
        (Some(chain), Some(index)) => format!("{}#{}", chain, index),
        _ => job
            .bindings
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub fn format_plan_text(session: &Session, checkpoint_exists: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Plan {}", session.name))
    ));
    out.push_str(&format!("  Session id: {}\n", session.id));
    out.push_str(&format!("  Jobs: {}\n", session.jobs.len()));
    if checkpoint_exists {
        out.push_str("  Checkpoint: exists (run will resume)\n");
    }
    out.push('\n');

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Job", "Item", "Prompt"]);
    for job in &session.jobs {
        table.add_row(vec![
            job.id.to_string(),
            job_label(job),
            truncate(&job.prompt, PLAN_PROMPT_WIDTH),
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_plan_json(session: &Session, checkpoint_exists: bool) -> Result<String, serde_json::Error> {
    let jobs: Vec<_> = session
        .jobs
        .iter()
        .map(|job| {
            json!({
                "job_id": job.id,
                "chain": job.chain,
                "sequence_index": job.sequence_index,
                "bindings": job.bindings,
                "prompt": job.prompt,
            })
        })
        .collect();
    serde_json::to_string_pretty(&json!({
        "session_id": session.id,
        "name": session.name,
        "checkpoint_exists": checkpoint_exists,
        "settings": session.settings,
        "generation": session.generation,
        "jobs": jobs,
    }))
}

pub fn format_run_summary(outcome: &RunOutcome, resumed: bool, results_path: &Path) -> String {
    let session = &outcome.session;
    let mut out = String::new();
    let title = if outcome.cancelled {
        format!("Session {} interrupted", session.name)
    } else {
        format!("Session {} finished", session.name)
    };
    out.push_str(&format!("{}\n\n", format_section_heading(&title)));
    out.push_str(&format!("  Id: {}\n", session.id));
    if resumed {
        out.push_str("  Resumed from checkpoint\n");
    }
    out.push_str(&format!("  Results: {}\n\n", results_path.display()));
    out.push_str(&format!("{}\n", counts_table(&session.counts)));

    let failed: Vec<_> = session.failed_jobs().collect();
    if !failed.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("Failed jobs")));
        for job in failed {
            let error = job
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            out.push_str(&format!("  {} ({}): {}\n", job.id, job_label(job), error.red()));
        }
    }
    if outcome.cancelled {
        out.push_str(&format!(
            "\n{} job(s) left pending. Run the same plan again to resume.\n",
            session.counts.pending
        ));
    }
    out
}

pub fn format_status_text(session: &Session) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Session {}", session.name))
    ));
    out.push_str(&format!("  Id: {}\n", session.id));
    out.push_str(&format!("  Source: {}\n", session.source));
    let state = if session.is_complete() {
        "complete".green().to_string()
    } else {
        "incomplete".yellow().to_string()
    };
    out.push_str(&format!("  State: {}\n\n", state));
    out.push_str(&format!("{}\n", counts_table(&session.counts)));
    out
}

pub fn format_status_json(session: &Session) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({
        "session_id": session.id,
        "name": session.name,
        "complete": session.is_complete(),
        "started_at": session.started_at,
        "ended_at": session.ended_at,
        "counts": session.counts,
    }))
}

pub fn format_sessions_text(entries: &[CheckpointSummary]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Sessions")));
    if entries.is_empty() {
        out.push_str("No checkpointed sessions.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Session", "Name", "Saved", "Done", "Failed", "Problem"]);
    for entry in entries {
        let (done, failed) = match &entry.counts {
            Some(c) => (
                format!("{}/{}", c.succeeded + c.cached + c.failed, c.total),
                c.failed.to_string(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            entry.session_id.clone(),
            entry.name.clone().unwrap_or_else(|| "-".to_string()),
            entry
                .saved_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            done,
            failed,
            entry.problem.clone().unwrap_or_default(),
        ]);
    }
    out.push_str(&format!("{}\n\n", table));
    out.push_str(&format!("Total: {} sessions.\n", entries.len()));
    out
}

pub fn format_cache_stats_text(stats: &CacheStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Artifact cache")));
    out.push_str(&format!("  Entries: {}\n", stats.entries));
    out.push_str(&format!("  Total hits: {}\n", stats.total_hits));
    if let Some(oldest) = stats.oldest {
        out.push_str(&format!("  Oldest: {}\n", oldest.to_rfc3339()));
    }
    if let Some(newest) = stats.newest {
        out.push_str(&format!("  Newest: {}\n", newest.to_rfc3339()));
    }
    out
}
