//! Durable sled-backed artifact cache.
//!
//! Maps content keys to the artifact a previous call produced. Entries are
//! shared across sessions and only removed by explicit maintenance
//! (`prune`), never from the generation path.

use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::types::{key_hex, ArtifactRef, ContentKey};

const TREE_CACHE: &str = "artifact_cache";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub artifact_ref: ArtifactRef,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
}

/// Result of a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// Same key, same artifact: nothing changed.
    Unchanged,
    /// Same key, different artifact. The new artifact replaced the old one.
    Collision { previous: ArtifactRef },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_hits: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

pub struct ArtifactCache {
    db: Db,
    entries: Tree,
    write_lock: Mutex<()>,
}

impl ArtifactCache {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let entries = db.open_tree(TREE_CACHE).map_err(to_storage_io)?;
        Ok(Self {
            db,
            entries,
            write_lock: Mutex::new(()),
        })
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path).map_err(to_storage_io)?;
        Self::new(db)
    }

    /// In-memory cache, discarded on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(to_storage_io)?;
        Self::new(db)
    }

    /// Look up a key and record the hit.
    pub fn get(&self, key: &ContentKey) -> Result<Option<ArtifactRef>, StorageError> {
        let _guard = self.write_lock.lock();
        let Some(mut entry) = self.read_entry(key)? else {
            return Ok(None);
        };
        entry.hit_count += 1;
        self.write_entry(key, &entry)?;
        Ok(Some(entry.artifact_ref))
    }

    /// Look up a key without touching its hit count.
    pub fn peek(&self, key: &ContentKey) -> Result<Option<CacheEntry>, StorageError> {
        self.read_entry(key)
    }

    /// Record the artifact for a key.
    ///
    /// Writing the same artifact again is a no-op. A different artifact under
    /// an existing key is a collision: it is logged and the new artifact wins.
    pub fn put(&self, key: &ContentKey, artifact: &ArtifactRef) -> Result<PutOutcome, StorageError> {
        let _guard = self.write_lock.lock();
        let outcome = match self.read_entry(key)? {
            Some(existing) if &existing.artifact_ref == artifact => return Ok(PutOutcome::Unchanged),
            Some(existing) => {
                warn!(
                    content_key = %key_hex(key),
                    previous = %existing.artifact_ref,
                    fresh = %artifact,
                    "CacheKeyCollision: key already maps to a different artifact"
                );
                PutOutcome::Collision {
                    previous: existing.artifact_ref,
                }
            }
            None => PutOutcome::Inserted,
        };
        let entry = CacheEntry {
            artifact_ref: artifact.clone(),
            created_at: Utc::now(),
            hit_count: 0,
        };
        self.write_entry(key, &entry)?;
        debug!(content_key = %key_hex(key), artifact = %artifact, "Cached artifact");
        Ok(outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let mut stats = CacheStats::default();
        for (_, entry) in self.list()? {
            stats.entries += 1;
            stats.total_hits += entry.hit_count;
            stats.oldest = Some(stats.oldest.map_or(entry.created_at, |t| t.min(entry.created_at)));
            stats.newest = Some(stats.newest.map_or(entry.created_at, |t| t.max(entry.created_at)));
        }
        Ok(stats)
    }

    /// Remove entries older than `max_age`, then the oldest entries beyond
    /// `max_entries`. Returns the number removed.
    pub fn prune(
        &self,
        max_age: Option<Duration>,
        max_entries: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.list()?;
        let mut removed = 0usize;

        if let Some(max_age) = max_age {
            let max_age = chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::weeks(52_000));
            let mut kept = Vec::with_capacity(entries.len());
            for (key, entry) in entries {
                if now.signed_duration_since(entry.created_at) > max_age {
                    self.entries.remove(key).map_err(to_storage_io)?;
                    removed += 1;
                } else {
                    kept.push((key, entry));
                }
            }
            entries = kept;
        }

        if let Some(max_entries) = max_entries {
            if entries.len() > max_entries {
                entries.sort_by_key(|(_, entry)| std::cmp::Reverse(entry.created_at));
                for (key, _) in entries.iter().skip(max_entries) {
                    self.entries.remove(key).map_err(to_storage_io)?;
                    removed += 1;
                }
            }
        }

        debug!(removed, "Pruned artifact cache");
        Ok(removed)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<(Vec<u8>, CacheEntry)>, StorageError> {
        let mut out = Vec::new();
        for result in self.entries.iter() {
            let (key, value) = result.map_err(to_storage_io)?;
            let entry: CacheEntry = bincode::deserialize(&value)?;
            out.push((key.to_vec(), entry));
        }
        Ok(out)
    }

    fn read_entry(&self, key: &ContentKey) -> Result<Option<CacheEntry>, StorageError> {
        let Some(raw) = self.entries.get(key).map_err(to_storage_io)? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(&raw)?))
    }

    fn write_entry(&self, key: &ContentKey, entry: &CacheEntry) -> Result<(), StorageError> {
        let value = bincode::serialize(entry)?;
        self.entries.insert(key, value).map_err(to_storage_io)?;
        Ok(())
    }
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}
