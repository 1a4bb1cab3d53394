//! Data models for stemsep-api
//!
//! - Job lifecycle state machine
//! - Stem results produced by the output resolver

pub mod job;

pub use job::{Job, JobStatus, StateTransition, StemResult};
