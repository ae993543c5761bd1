//! Run configuration.
//!
//! Everything the core needs is gathered into a [`SubmitConfig`] once at
//! startup and passed down explicitly; no module reads global defaults.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use walkdir::WalkDir;

use crate::command::{prun_suffix, GridOptions, JobSizing, PrunOptions};
use crate::error::ConfigError;
use crate::naming::NamingContext;

/// Default ntuple production tag.
pub const DEFAULT_TAG: &str = "n0146";
/// Default grid nickname for user-scoped outputs.
pub const DEFAULT_NICKNAME: &str = "sfarrell";
/// Default file listing sites to exclude.
pub const DEFAULT_BLACKLIST: &str = "txt/blacklist.txt";

/// Category of datasets being submitted; selects default inputs and pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Collision data.
    Data,
    /// Standard model simulation.
    Mc,
    /// SUSY signal simulation.
    Susy,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Data => "data",
            JobKind::Mc => "mc",
            JobKind::Susy => "susy",
        }
    }

    /// Reference data has no simulation campaign to classify.
    pub fn is_data(&self) -> bool {
        matches!(self, JobKind::Data)
    }

    pub fn default_pattern(&self) -> &'static str {
        match self {
            JobKind::Data => "data",
            JobKind::Mc | JobKind::Susy => "mc",
        }
    }

    /// Default manifests, resolved against `base`.
    pub fn default_inputs(&self, base: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        match self {
            JobKind::Data => Ok(["data12_Egamma.txt", "data12_Muons.txt"]
                .iter()
                .map(|f| base.join("txt/data").join(f))
                .collect()),
            JobKind::Mc => discover_manifests(&base.join("txt/background")),
            JobKind::Susy => discover_manifests(&base.join("txt/signal/p1512")),
        }
    }
}

/// Lists the `*.txt` manifests directly inside `dir`, sorted by name.
pub fn discover_manifests(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            found.push(path.to_path_buf());
        }
    }
    Ok(found)
}

/// Reads the site blacklist, joining its lines into a single value.
pub fn load_site_blacklist(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.replace(['\n', '\r'], ""))
}

/// Complete configuration of one submission run.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitConfig {
    pub job: JobKind,
    pub input_files: Vec<PathBuf>,
    /// Free-text selection pattern tested against each raw manifest line.
    pub pattern: String,
    pub ignore_case: bool,
    pub naming: NamingContext,
    pub grid: GridOptions,
    pub prun: PrunOptions,
    /// Log full submission commands at info level.
    pub verbose: bool,
    /// Abort the run at the first failing job instead of skipping it.
    pub fail_fast: bool,
}

impl SubmitConfig {
    /// Creates a configuration with the defaults for `job`.
    pub fn new(job: JobKind) -> Self {
        Self {
            job,
            input_files: Vec::new(),
            pattern: job.default_pattern().to_string(),
            ignore_case: false,
            naming: NamingContext::new(DEFAULT_TAG, DEFAULT_NICKNAME)
                .with_prun_suffix(prun_suffix()),
            grid: GridOptions::default(),
            prun: PrunOptions::default(),
            verbose: false,
            fail_fast: false,
        }
    }

    /// Builder method to set input manifests.
    pub fn with_input_files(mut self, files: Vec<PathBuf>) -> Self {
        self.input_files = files;
        self
    }

    /// Builder method to set the selection pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Builder method to set the naming tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.naming.tag = tag.into();
        self
    }

    /// Builder method to set the grid nickname.
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.naming.nickname = nickname.into();
        self
    }

    /// Builder method to submit with the group production role. Keeps the
    /// naming and submission settings in step.
    pub fn with_group_role(mut self, use_group_role: bool) -> Self {
        self.naming.use_group_role = use_group_role;
        self.prun.use_group_role = use_group_role;
        self
    }

    /// Compiles the selection pattern.
    pub fn selection_regex(&self) -> Result<Regex, ConfigError> {
        RegexBuilder::new(&self.pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .map_err(|source| ConfigError::Pattern {
                pattern: self.pattern.clone(),
                source,
            })
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` or `ConfigError::InvalidValue`
    /// if any values are unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.naming.tag.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "tag cannot be empty".to_string(),
            ));
        }

        if self.naming.tag.contains(['/', ' ']) {
            return Err(ConfigError::InvalidValue {
                key: "tag".to_string(),
                message: format!("'{}' must not contain '/' or spaces", self.naming.tag),
            });
        }

        if !self.naming.use_group_role && self.naming.nickname.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "nickname cannot be empty without the group role".to_string(),
            ));
        }

        if self.naming.use_group_role != self.prun.use_group_role {
            return Err(ConfigError::ValidationFailed(
                "group role must be set for both naming and submission".to_string(),
            ));
        }

        if self.prun.dest_se.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "destination site cannot be empty".to_string(),
            ));
        }

        match &self.prun.sizing {
            JobSizing::FilesPerJob(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "nFilesPerJob".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            JobSizing::GbPerJob(gb) if gb != "MAX" && gb.parse::<u32>().map_or(true, |v| v == 0) => {
                return Err(ConfigError::InvalidValue {
                    key: "nGBPerJob".to_string(),
                    message: format!("expected a positive integer or MAX, got '{}'", gb),
                });
            }
            _ => {}
        }

        if self.input_files.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "no input manifests to process".to_string(),
            ));
        }

        self.selection_regex()?;
        Ok(())
    }
}
