//! Shared identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Deterministic key identifying a job's cacheable inputs.
pub type ContentKey = Hash;

/// Stable job identifier, assigned at planning time and never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u32);

impl JobId {
    pub fn new(value: u32) -> Self {
        JobId(value)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{:05}", self.0)
    }
}

/// Opaque reference to an artifact produced by the generation service.
///
/// The engine never interprets the bytes behind a reference; it only stores,
/// compares and forwards references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(value: impl Into<String>) -> Self {
        ArtifactRef(value.into())
    }

    /// Reference for content-addressed bytes: `blake3:<hex>`.
    pub fn from_digest(digest: &Hash) -> Self {
        ArtifactRef(format!("blake3:{}", hex::encode(digest)))
    }

    /// Digest encoded in a `blake3:<hex>` reference, if it is one.
    pub fn digest(&self) -> Option<Hash> {
        let hex_part = self.0.strip_prefix("blake3:")?;
        let bytes = hex::decode(hex_part).ok()?;
        bytes.try_into().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encode a content key for logs and file names.
pub fn key_hex(key: &ContentKey) -> String {
    hex::encode(key)
}

/// Serde helper storing an optional content key as a hex string.
pub mod opt_key_hex {
    use super::ContentKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Option<ContentKey>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(key) => s.serialize_some(&hex::encode(key)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ContentKey>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|text| {
            let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("content key must be 32 bytes"))
        })
        .transpose()
    }
}
