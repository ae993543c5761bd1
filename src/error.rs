//! Error types for ntsubmit operations.
//!
//! Defines the error taxonomy for every stage of a submission run:
//! - Manifest parsing and dataset-name inspection
//! - Replacement rule loading
//! - Run configuration
//! - Hand-off to the external submission tool
//!
//! Output names that exceed the length ceiling are not errors; they are
//! reported through [`NamingConstraintWarning`] alongside the derived name.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while interpreting manifest content or dataset names.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unable to parse reconstruction tag from dataset '{dataset}' (extracted '{extracted}')")]
    RecoTag { dataset: String, extracted: String },

    #[error("Invalid cross-section expression '{value}': {reason}")]
    CrossSection { value: String, reason: String },

    #[error("{file}:{line}: invalid {field}: {source}")]
    Line {
        file: String,
        line: usize,
        field: &'static str,
        #[source]
        source: Box<ParseError>,
    },
}

/// Errors produced while reading a manifest file.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Raised when a derived output dataset name is still longer than the
/// enforced ceiling after every shortening step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Output dataset name '{name}' is {length} characters with suffix, limit is {limit}")]
pub struct NamingConstraintWarning {
    pub name: String,
    pub length: usize,
    pub limit: usize,
}

/// Errors that can occur while loading replacement rule tables.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Failed to read rules file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid pattern '{pattern}' in rule table '{table}': {source}")]
    InvalidPattern {
        table: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported rules version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Rules must define a non-empty canonical marker")]
    MissingMarker,
}

/// Errors that can occur while building the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid selection pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by the submission hand-off.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Failed to launch submission command for '{dataset}': {source}")]
    Spawn {
        dataset: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Submission tool failed for '{dataset}' with {}", describe_exit(*code))]
    ExternalToolFailure { dataset: String, code: Option<i32> },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

/// Any failure that aborts a single job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Errors that end a whole submission run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Run aborted: {0}")]
    Job(#[from] JobError),
}
