//! Artifact storage
//!
//! Content-addressed storage for artifact bytes returned by generation
//! services. Artifacts are stored at paths derived from the BLAKE3 digest of
//! their bytes, and referenced as `blake3:<hex>`.

use crate::error::StorageError;
use crate::fingerprint::compute_hash;
use crate::types::{ArtifactRef, Hash};
use std::fs;
use std::path::{Path, PathBuf};

/// Content-addressed artifact storage
///
/// Layout: `{root}/artifacts/{hex[0..2]}/{hex[2..4]}/{hex}.bin`
///
/// Writing the same bytes twice lands on the same path and is a no-op.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a new ArtifactStore at the given root path
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        let artifacts_dir = root.join("artifacts");
        fs::create_dir_all(&artifacts_dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create artifacts directory at {:?}: {}", artifacts_dir, e),
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store artifact bytes and return their reference.
    ///
    /// Uses atomic writes (write to .tmp, then rename).
    pub fn put(&self, bytes: &[u8]) -> Result<ArtifactRef, StorageError> {
        let digest = compute_hash(bytes);
        let reference = ArtifactRef::from_digest(&digest);
        let path = self.artifact_path(&digest);
        if path.exists() {
            return Ok(reference);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("bin.tmp");
        fs::write(&temp_path, bytes).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write artifact to {:?}: {}", temp_path, e),
            ))
        })?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            ))
        })?;

        Ok(reference)
    }

    /// Read artifact bytes, verifying they still match their digest.
    ///
    /// Returns `None` if the reference is unknown or not content-addressed.
    pub fn get(&self, reference: &ArtifactRef) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(digest) = reference.digest() else {
            return Ok(None);
        };
        let path = self.artifact_path(&digest);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let actual = compute_hash(&bytes);
        if actual != digest {
            return Err(StorageError::HashMismatch {
                expected: digest,
                actual,
            });
        }
        Ok(Some(bytes))
    }

    pub fn exists(&self, reference: &ArtifactRef) -> bool {
        reference
            .digest()
            .map(|digest| self.artifact_path(&digest).exists())
            .unwrap_or(false)
    }

    /// Filesystem location of an artifact, if the reference is content-addressed.
    pub fn path_of(&self, reference: &ArtifactRef) -> Option<PathBuf> {
        reference.digest().map(|digest| self.artifact_path(&digest))
    }

    fn artifact_path(&self, digest: &Hash) -> PathBuf {
        let hex = hex::encode(digest);
        self.root
            .join("artifacts")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{}.bin", hex))
    }
}
