//! Context Tracker
//!
//! Per-session record of successful chain outputs. For chain step `i` the
//! context is the artifacts of the last `k` steps with index below `i` that
//! ended with an artifact (`Succeeded` or `Cached`), oldest first. Failed
//! steps are skipped, so a failure narrows the window instead of breaking the
//! chain.

use crate::session::Session;
use crate::types::ArtifactRef;
use std::collections::{BTreeMap, HashMap};

pub struct ContextTracker {
    window: usize,
    chains: HashMap<String, BTreeMap<u32, ArtifactRef>>,
}

impl ContextTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            chains: HashMap::new(),
        }
    }

    /// Rebuild from a session's recorded outcomes, for resumed runs.
    pub fn from_session(session: &Session, window: usize) -> Self {
        let mut tracker = Self::new(window);
        for job in &session.jobs {
            if let (Some(chain), Some(index), Some(artifact)) =
                (&job.chain, job.sequence_index, &job.artifact_ref)
            {
                if job.status.is_success() {
                    tracker.record_success(chain, index, artifact.clone());
                }
            }
        }
        tracker
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn record_success(&mut self, chain: &str, sequence_index: u32, artifact: ArtifactRef) {
        self.chains
            .entry(chain.to_string())
            .or_default()
            .insert(sequence_index, artifact);
    }

    /// Context window for step `sequence_index` of `chain`.
    pub fn context_for(&self, chain: &str, sequence_index: u32) -> Vec<ArtifactRef> {
        let Some(successes) = self.chains.get(chain) else {
            return Vec::new();
        };
        let mut window: Vec<ArtifactRef> = successes
            .range(..sequence_index)
            .rev()
            .take(self.window)
            .map(|(_, artifact)| artifact.clone())
            .collect();
        window.reverse();
        window
    }
}
