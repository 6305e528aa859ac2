//! Checkpoint persistence for resumable sessions.
//!
//! One JSON file per session, `{dir}/{session_id}.json`, holding a versioned
//! envelope: `{ v, session_id, saved_at, digest, session }`. The digest is
//! BLAKE3 over the canonical JSON of the session and is checked on load, as
//! are the session's structural invariants. Writes go to a temp file that is
//! synced and then renamed over the previous checkpoint, so a reader only
//! ever sees a complete checkpoint.

use crate::error::{EngineError, StorageError};
use crate::session::{Session, SessionCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Current checkpoint schema version
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointEnvelope {
    #[serde(rename = "v")]
    version: u32,
    session_id: String,
    saved_at: DateTime<Utc>,
    digest: String,
    session: serde_json::Value,
}

/// Listing entry for a stored checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointSummary {
    pub session_id: String,
    pub name: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
    pub counts: Option<SessionCounts>,
    /// Why the checkpoint could not be read, if it could not.
    pub problem: Option<String>,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create checkpoint directory at {:?}: {}", dir, e),
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> Result<PathBuf, StorageError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Atomically persist the session. `Running` jobs are stored as `Pending`.
    pub fn save(&self, session: &Session) -> Result<PathBuf, StorageError> {
        let path = self.path_for(&session.id)?;
        let snapshot = session.snapshot();
        let value = serde_json::to_value(&snapshot)?;
        let envelope = CheckpointEnvelope {
            version: CHECKPOINT_VERSION,
            session_id: snapshot.id.clone(),
            saved_at: Utc::now(),
            digest: digest_of(&value)?,
            session: value,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename checkpoint into place at {:?}: {}", path, e),
            ))
        })?;
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        debug!(
            session_id = %snapshot.id,
            succeeded = snapshot.counts.succeeded,
            cached = snapshot.counts.cached,
            failed = snapshot.counts.failed,
            pending = snapshot.counts.pending,
            "Checkpoint saved"
        );
        Ok(path)
    }

    /// Load and verify a checkpoint.
    pub fn load(&self, session_id: &str) -> Result<Session, EngineError> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Err(EngineError::CheckpointNotFound(session_id.to_string()));
        }
        let bytes = fs::read(&path)?;
        decode(session_id, &bytes).map(|(_, session)| session)
    }

    /// Move a checkpoint aside to `{session_id}.json.bak` so the session can
    /// start fresh. Only called after explicit confirmation.
    pub fn set_aside(&self, session_id: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(session_id)?;
        let aside = path.with_extension("json.bak");
        if aside.exists() {
            fs::remove_file(&aside)?;
        }
        fs::rename(&path, &aside)?;
        warn!(session_id, path = %aside.display(), "Checkpoint set aside");
        Ok(aside)
    }

    pub fn remove(&self, session_id: &str) -> Result<(), StorageError> {
        let path = self.path_for(session_id)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Every checkpoint in the directory, newest first. Unreadable
    /// checkpoints are listed with the reason instead of being skipped.
    pub fn list(&self) -> Result<Vec<CheckpointSummary>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let summary = match fs::read(&path)
                .map_err(EngineError::from)
                .and_then(|bytes| decode(session_id, &bytes))
            {
                Ok((saved_at, session)) => CheckpointSummary {
                    session_id: session.id.clone(),
                    name: Some(session.name.clone()),
                    saved_at: Some(saved_at),
                    counts: Some(session.counts.clone()),
                    problem: None,
                },
                Err(e) => CheckpointSummary {
                    session_id: session_id.to_string(),
                    name: None,
                    saved_at: None,
                    counts: None,
                    problem: Some(e.to_string()),
                },
            };
            out.push(summary);
        }
        out.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(out)
    }
}

fn decode(session_id: &str, bytes: &[u8]) -> Result<(DateTime<Utc>, Session), EngineError> {
    let corrupt = |reason: String| EngineError::CheckpointCorruption {
        session_id: session_id.to_string(),
        reason,
    };

    let envelope: CheckpointEnvelope =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("unreadable envelope: {}", e)))?;
    if envelope.version != CHECKPOINT_VERSION {
        return Err(corrupt(format!(
            "unsupported checkpoint version {} (expected {})",
            envelope.version, CHECKPOINT_VERSION
        )));
    }
    if envelope.session_id != session_id {
        return Err(corrupt(format!(
            "checkpoint belongs to session '{}'",
            envelope.session_id
        )));
    }
    let actual = digest_of(&envelope.session).map_err(|e| corrupt(e.to_string()))?;
    if actual != envelope.digest {
        return Err(corrupt(format!(
            "digest mismatch (recorded {}, computed {})",
            envelope.digest, actual
        )));
    }
    let mut session: Session = serde_json::from_value(envelope.session)
        .map_err(|e| corrupt(format!("unreadable session: {}", e)))?;
    if session.id != session_id {
        return Err(corrupt(format!("session id '{}' does not match", session.id)));
    }
    session.verify_structure().map_err(corrupt)?;
    session.recount();
    Ok((envelope.saved_at, session))
}

/// Digest of a JSON value. `serde_json::Value` maps are key-sorted, so the
/// encoding is canonical.
fn digest_of(value: &serde_json::Value) -> Result<String, StorageError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn validate_session_id(session_id: &str) -> Result<(), StorageError> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StorageError::InvalidPath(format!(
            "invalid session id '{}'",
            session_id
        )));
    }
    Ok(())
}
