//! Property tests for planning and keying determinism

mod determinism;
