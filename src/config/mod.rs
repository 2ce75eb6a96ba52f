// src/config/mod.rs

//! User-facing job definitions.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads definitions from disk and optionally builds the job.

pub mod loader;
pub mod model;

pub use loader::{load_and_build, load_definition};
pub use model::{
    Branch, ExecutableDefinition, FlowDefinition, JobDefinition, JobSection, SchedulerSettings,
    TaskDefinition,
};
