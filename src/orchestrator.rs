//! Sequential submission run over all manifests.
//!
//! Each job is taken through parse, classify, name, build and hand-off before
//! the next line is read. A failing job is logged and counted, then skipped,
//! unless the configuration asks to stop at the first failure.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::command::{CommandBuilder, JobCommand};
use crate::config::SubmitConfig;
use crate::era;
use crate::error::{JobError, NamingConstraintWarning, ParseError, RunError};
use crate::manifest::{JobDefinition, ManifestReader};
use crate::naming::DatasetNamer;
use crate::rules::NamingRules;
use crate::sample::sample_label;
use crate::submit::Submitter;

/// Final state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Failed,
}

/// Record of one attempted job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    /// Manifest the job came from.
    pub manifest: String,
    pub input_dataset: Option<String>,
    pub output_dataset: Option<String>,
    pub status: JobStatus,
    pub length_warning: bool,
    pub error: Option<String>,
}

/// Summary of a submission run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub tag: String,
    pub pattern: String,
    pub manifests: usize,
    pub attempted: usize,
    pub submitted: usize,
    pub failed: usize,
    pub length_warnings: usize,
    pub jobs: Vec<JobOutcome>,
    pub started_at: String,
    pub finished_at: String,
}

/// A job ready for hand-off, with any naming warning it carries.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub command: JobCommand,
    pub warning: Option<NamingConstraintWarning>,
}

pub struct SubmissionOrchestrator {
    config: SubmitConfig,
    rules: NamingRules,
    submitter: Arc<dyn Submitter>,
}

impl SubmissionOrchestrator {
    pub fn new(config: SubmitConfig, rules: NamingRules, submitter: Arc<dyn Submitter>) -> Self {
        Self {
            config,
            rules,
            submitter,
        }
    }

    /// Builds the commands for one job definition.
    pub fn prepare(
        &self,
        namer: &DatasetNamer<'_>,
        definition: &JobDefinition,
    ) -> Result<PreparedJob, ParseError> {
        let dataset = definition.dataset.as_str();
        let sample = sample_label(dataset, &self.rules);

        let production = if self.config.job.is_data() {
            None
        } else {
            let production = era::classify(dataset)?;
            debug!(dataset, era = production.era(), "Classified production era");
            Some(production)
        };

        let output = namer.name(dataset);
        let builder = CommandBuilder::new(&self.config.grid, &self.config.prun);
        let grid_command = builder.grid_command(definition, &sample, production);
        let prun_command = builder.prun_command(dataset, output.as_str(), &grid_command);

        Ok(PreparedJob {
            warning: output.warning().cloned(),
            command: JobCommand {
                input_dataset: dataset.to_string(),
                output_dataset: output.into_string(),
                sample,
                production: production.map(|p| p.to_string()),
                grid_command,
                prun_command,
            },
        })
    }

    /// Processes every manifest in order.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Config` for an invalid configuration, and
    /// `RunError::Job` for the first job failure when `fail_fast` is set.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        self.config.validate()?;
        let pattern = self.config.selection_regex()?;
        let namer = DatasetNamer::new(&self.config.naming, &self.rules);
        let started_at = Utc::now();

        info!(
            job = self.config.job.as_str(),
            tag = %self.config.naming.tag,
            pattern = %self.config.pattern,
            inputs = ?self.config.input_files,
            "Starting submission run"
        );

        let mut jobs = Vec::new();
        for path in &self.config.input_files {
            let manifest = path.display().to_string();
            let reader = match ManifestReader::open(path, &pattern) {
                Ok(reader) => reader,
                Err(e) => {
                    self.record_failure(&mut jobs, &manifest, None, e.into())?;
                    continue;
                }
            };
            debug!(manifest = %reader.source().display(), "Reading manifest");

            for item in reader {
                let definition = match item {
                    Ok(definition) => definition,
                    Err(e) => {
                        self.record_failure(&mut jobs, &manifest, None, e.into())?;
                        continue;
                    }
                };

                match self.process(&namer, &manifest, &definition).await {
                    Ok(outcome) => jobs.push(outcome),
                    Err(e) => {
                        self.record_failure(&mut jobs, &manifest, Some(&definition.dataset), e)?;
                    }
                }
            }
        }

        let submitted = jobs.iter().filter(|j| j.status == JobStatus::Submitted).count();
        let summary = RunSummary {
            job: self.config.job.as_str().to_string(),
            tag: self.config.naming.tag.clone(),
            pattern: self.config.pattern.clone(),
            manifests: self.config.input_files.len(),
            attempted: jobs.len(),
            submitted,
            failed: jobs.len() - submitted,
            length_warnings: jobs.iter().filter(|j| j.length_warning).count(),
            jobs,
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
        };

        info!(
            attempted = summary.attempted,
            submitted = summary.submitted,
            failed = summary.failed,
            length_warnings = summary.length_warnings,
            "Submission run finished"
        );

        Ok(summary)
    }

    async fn process(
        &self,
        namer: &DatasetNamer<'_>,
        manifest: &str,
        definition: &JobDefinition,
    ) -> Result<JobOutcome, JobError> {
        let prepared = self.prepare(namer, definition)?;
        let command = &prepared.command;

        info!(
            input = %command.input_dataset,
            output = %command.output_dataset,
            sample = %command.sample,
            command = %command.grid_command,
            "Prepared job"
        );
        if self.config.verbose {
            info!(prun = %command.prun_command, "Submission command");
        } else {
            debug!(prun = %command.prun_command, "Submission command");
        }
        if let Some(warning) = &prepared.warning {
            warn!(%warning, "Output dataset name exceeds the length limit, submission may be rejected");
        }

        self.submitter.submit(command).await?;

        Ok(JobOutcome {
            manifest: manifest.to_string(),
            input_dataset: Some(command.input_dataset.clone()),
            output_dataset: Some(command.output_dataset.clone()),
            status: JobStatus::Submitted,
            length_warning: prepared.warning.is_some(),
            error: None,
        })
    }

    fn record_failure(
        &self,
        jobs: &mut Vec<JobOutcome>,
        manifest: &str,
        dataset: Option<&str>,
        err: JobError,
    ) -> Result<(), RunError> {
        if self.config.fail_fast {
            error!(manifest, dataset, error = %err, "Job failed, aborting run");
            return Err(err.into());
        }

        error!(manifest, dataset, error = %err, "Job failed, skipping");
        jobs.push(JobOutcome {
            manifest: manifest.to_string(),
            input_dataset: dataset.map(str::to_string),
            output_dataset: None,
            status: JobStatus::Failed,
            length_warning: false,
            error: Some(err.to_string()),
        });
        Ok(())
    }
}
