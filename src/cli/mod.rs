//! Command-line interface for ntsubmit.
//!
//! Provides commands for submitting manifests, previewing output dataset
//! names, and inspecting the active naming rules.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
