//! Job Planner
//!
//! Turns a plan input (template, variable domains, sampling directive and
//! dependent chains) into a session whose full job list is fixed up front.
//! Planning is deterministic: the same input and generation config always
//! produce the same jobs with the same ids in the same order.

pub mod input;
pub mod planner;
pub mod sampler;
pub mod template;

pub use input::{ChainInput, PlanInput, PlanOverrides};
pub use planner::{derive_session_id, JobPlanner, DEFAULT_MAX_COMBINATIONS};
pub use sampler::{Bindings, CombinationSpace};
