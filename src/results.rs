//! Append-only result log.
//!
//! One JSON line per job that reached a terminal status, in completion order.
//! Each append is flushed and synced before returning, so after a crash the
//! file holds a valid prefix plus at most one torn final line, which readers
//! ignore and the next writer trims.

use crate::error::{ServiceError, StorageError};
use crate::job::{Job, JobStatus};
use crate::types::{key_hex, ArtifactRef, JobId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub session_id: String,
    pub job_id: JobId,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub sequence_index: Option<u32>,
    pub status: JobStatus,
    pub attempts: u32,
    pub prompt: String,
    #[serde(default)]
    pub bindings: IndexMap<String, String>,
    #[serde(default)]
    pub context: Vec<ArtifactRef>,
    #[serde(default)]
    pub content_key: Option<String>,
    #[serde(default)]
    pub artifact_ref: Option<ArtifactRef>,
    #[serde(default)]
    pub error: Option<ServiceError>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl ResultRecord {
    pub fn from_job(session_id: &str, job: &Job) -> Self {
        Self {
            session_id: session_id.to_string(),
            job_id: job.id,
            chain: job.chain.clone(),
            sequence_index: job.sequence_index,
            status: job.status,
            attempts: job.attempts,
            prompt: job.prompt.clone(),
            bindings: job.bindings.clone(),
            context: job.context_ref.clone(),
            content_key: job.content_key.as_ref().map(key_hex),
            artifact_ref: job.artifact_ref.clone(),
            error: job.last_error.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            duration_ms: job.duration_ms(),
        }
    }
}

pub struct ResultLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultLog {
    /// Open for appending, creating the file if needed. A torn final line
    /// left by a crash is trimmed first so new records start on a fresh line.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        trim_torn_tail(&path, &mut file)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ResultRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Read the valid prefix of a log. Reading stops at the first line that
    /// does not parse; a missing file reads as empty.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<ResultRecord>, StorageError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path)?;
        let mut records = Vec::new();
        for line in bytes.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<ResultRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        valid_records = records.len(),
                        error = %e,
                        "Result log ends with an unreadable line"
                    );
                    break;
                }
            }
        }
        Ok(records)
    }
}

fn trim_torn_tail(path: &Path, file: &mut File) -> Result<(), StorageError> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "Trimming torn final line from result log"
    );
    file.set_len(keep as u64)?;
    file.seek(SeekFrom::End(0))?;
    Ok(())
}
