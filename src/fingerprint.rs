//! Content key computation using BLAKE3
//!
//! A content key identifies everything that influences what the generation
//! service would return for a job:
//!
//! key = hash("genloom:v1" || prompt || bindings || context || config)
//!
//! Every section is length-prefixed (8 bytes, big-endian) so that adjacent
//! fields can never be confused with each other.

use crate::service::GenerationConfig;
use crate::types::{ArtifactRef, ContentKey, Hash};
use blake3::Hasher;
use indexmap::IndexMap;
use unicode_normalization::UnicodeNormalization;

const KEY_DOMAIN: &[u8] = b"genloom:v1";

/// Normalize a prompt before hashing.
///
/// Applies Unicode NFC, trims the ends and collapses internal whitespace runs
/// to a single space. Prompts that differ only in whitespace share a key.
pub fn normalize_prompt(prompt: &str) -> String {
    let composed: String = prompt.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fingerprint of an ordered context window.
///
/// Order matters: the same artifacts in a different order are a different context.
/// The empty window has a fixed, well-known fingerprint.
pub fn context_fingerprint(context: &[ArtifactRef]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(b"context");
    hasher.update(&(context.len() as u64).to_be_bytes());
    for artifact in context {
        update_field(&mut hasher, artifact.as_str().as_bytes());
    }
    *hasher.finalize().as_bytes()
}

/// Compute the content key for a job.
///
/// Bindings are hashed sorted by name; their insertion order is irrelevant.
pub fn compute_content_key(
    prompt: &str,
    bindings: &IndexMap<String, String>,
    context_fingerprint: &Hash,
    config: &GenerationConfig,
) -> ContentKey {
    let normalized = normalize_prompt(prompt);

    let mut hasher = Hasher::new();
    hasher.update(KEY_DOMAIN);

    hasher.update(b"prompt");
    update_field(&mut hasher, normalized.as_bytes());

    let mut sorted: Vec<(&String, &String)> = bindings.iter().collect();
    sorted.sort();
    hasher.update(b"bindings");
    hasher.update(&(sorted.len() as u64).to_be_bytes());
    for (name, value) in sorted {
        update_field(&mut hasher, name.as_bytes());
        update_field(&mut hasher, value.as_bytes());
    }

    hasher.update(b"context");
    hasher.update(context_fingerprint);

    hasher.update(b"config");
    update_field(&mut hasher, config.quality.as_bytes());
    hasher.update(&config.width.to_be_bytes());
    hasher.update(&config.height.to_be_bytes());
    update_field(&mut hasher, config.model_id.as_bytes());

    *hasher.finalize().as_bytes()
}

/// Compute a generic hash of arbitrary data
pub fn compute_hash(data: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

fn update_field(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
