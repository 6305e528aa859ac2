//! Error types for the generation orchestration engine.

use crate::types::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Hash mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        ))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors raised while turning a plan into jobs. Always fatal, raised before any call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Template is empty")]
    EmptyTemplate,

    #[error("Template variables do not match domains (unknown placeholders: {unknown:?}, unused variables: {unused:?})")]
    Validation {
        unknown: Vec<String>,
        unused: Vec<String>,
    },

    #[error("Variable '{0}' has no candidate values")]
    EmptyDomain(String),

    #[error("Total combinations ({total}) exceeds maximum allowed ({ceiling}); use random sampling instead")]
    TooManyCombinations { total: u128, ceiling: u64 },

    #[error("Chain '{0}' is declared more than once")]
    DuplicateChain(String),

    #[error("Invalid plan: {0}")]
    Invalid(String),
}

/// Category of a generation service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    RateLimited,
    Timeout,
    Unavailable,
    Connection,
    InvalidRequest,
    Denied,
    Other,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceErrorKind::RateLimited => "rate_limited",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::Unavailable => "unavailable",
            ServiceErrorKind::Connection => "connection",
            ServiceErrorKind::InvalidRequest => "invalid_request",
            ServiceErrorKind::Denied => "denied",
            ServiceErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure reported by a generation service adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Timeout, message)
    }
}

/// Top-level engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No checkpoint found for session '{0}'")]
    CheckpointNotFound(String),

    #[error("Checkpoint for session '{session_id}' is corrupt: {reason}. Re-run with --fresh to discard it and start over")]
    CheckpointCorruption { session_id: String, reason: String },

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session '{0}' was cancelled")]
    Cancelled(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(StorageError::IoError(err))
    }
}
