//! Hand-off of assembled jobs to the external submission tool.

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::command::JobCommand;
use crate::error::SubmitError;

/// Receives each assembled job, in order.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, job: &JobCommand) -> Result<(), SubmitError>;
}

/// Runs the prun command through the shell and waits for it to exit.
#[derive(Debug, Clone)]
pub struct PrunSubmitter {
    shell: String,
}

impl Default for PrunSubmitter {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl PrunSubmitter {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl Submitter for PrunSubmitter {
    async fn submit(&self, job: &JobCommand) -> Result<(), SubmitError> {
        debug!(shell = %self.shell, command = %job.prun_command, "Launching submission");

        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&job.prun_command)
            .status()
            .await
            .map_err(|source| SubmitError::Spawn {
                dataset: job.input_dataset.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SubmitError::ExternalToolFailure {
                dataset: job.input_dataset.clone(),
                code: status.code(),
            })
        }
    }
}

/// Keeps jobs in memory instead of submitting them.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    jobs: Mutex<Vec<JobCommand>>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs received so far, in submission order.
    pub async fn jobs(&self) -> Vec<JobCommand> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl Submitter for RecordingSubmitter {
    async fn submit(&self, job: &JobCommand) -> Result<(), SubmitError> {
        info!(dataset = %job.input_dataset, "Dry run, not submitting");
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }
}
