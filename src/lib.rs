//! ntsubmit: grid submission helper for ntuple production.
//!
//! This library reads dataset manifests, derives canonical output dataset
//! names, and assembles the commands handed to the grid submission tool.

// Core modules
pub mod cli;
pub mod command;
pub mod config;
pub mod era;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod orchestrator;
pub mod rules;
pub mod sample;
pub mod submit;

// Re-export commonly used error types
pub use error::{
    ConfigError, JobError, ManifestError, NamingConstraintWarning, ParseError, RulesError,
    RunError, SubmitError,
};
