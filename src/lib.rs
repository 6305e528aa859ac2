//! genloom: checkpointed batch generation
//!
//! Expands prompt templates over variable domains (or ordered chains of
//! dependent steps) into jobs, then drives them through a rate-limited,
//! retrying worker pool against an external generation service. Results are
//! cached by content key and sessions checkpoint durably so an interrupted
//! run resumes where it stopped.

pub mod artifact;
pub mod cache;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod logging;
pub mod plan;
pub mod ratelimit;
pub mod report;
pub mod results;
pub mod retry;
pub mod rng;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod types;
