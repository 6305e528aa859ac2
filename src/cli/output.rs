//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::EngineError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &EngineError) -> String {
    e.to_string()
}

/// Process exit code per error category.
pub fn exit_code(e: &EngineError) -> i32 {
    match e {
        EngineError::Planning(_) => 2,
        EngineError::CheckpointCorruption { .. } => 3,
        EngineError::Cancelled(_) => 130,
        _ => 1,
    }
}
