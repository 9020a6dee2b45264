//! Job Submission: scheduler seam shared by every stage.
//!
//! Stages never talk to the scheduler directly; they receive a
//! `&dyn Submitter` through their context. Debug mode swaps the real
//! submitter for [`DryRunSubmitter`] once, before the first stage runs.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::token::{Dependency, JobHandle};

/// Job id handed out by the dry-run submitter.
pub const FAKE_JOB_ID: &str = "123456";

lazy_static! {
    /// `sbatch` output without `--parsable`
    static ref SUBMITTED_BATCH_JOB: Regex = Regex::new(r"Submitted batch job (\d+)").unwrap();
}

/// A rendered batch script ready to be queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub name: String,
    pub script: PathBuf,
    #[serde(skip)]
    pub body: String,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("SUBMIT/SPAWN: failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SUBMIT/REJECTED: `{program}` exited with {code:?}: {stderr}")]
    Rejected {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("SUBMIT/OUTPUT: no job id in `{0}`")]
    UnparsableOutput(String),
}

pub trait Submitter: Send + Sync {
    /// Queue `job` so that it starts only after `after` has finished.
    fn submit(&self, job: &JobSpec, after: &Dependency) -> Result<JobHandle, SubmitError>;

    /// True when submissions never reach a scheduler.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Queues jobs on a Slurm cluster through `sbatch`.
#[derive(Debug, Clone)]
pub struct SlurmSubmitter {
    program: String,
}

impl SlurmSubmitter {
    pub fn new() -> Self {
        Self::with_program("sbatch")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command_args(job: &JobSpec, after: &Dependency) -> Vec<String> {
        let mut args = vec!["--parsable".to_string()];
        if let Some(handle) = after.handle() {
            args.push(format!("--dependency=afterany:{}", handle.id()));
        }
        args.push(job.script.display().to_string());
        args
    }
}

impl Default for SlurmSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Submitter for SlurmSubmitter {
    fn submit(&self, job: &JobSpec, after: &Dependency) -> Result<JobHandle, SubmitError> {
        let args = Self::command_args(job, after);
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| SubmitError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SubmitError::Rejected {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = parse_job_id(&stdout)
            .ok_or_else(|| SubmitError::UnparsableOutput(stdout.trim().to_string()))?;

        tracing::debug!(job = %job.name, id = %id, "sbatch accepted job");
        Ok(JobHandle::new(id))
    }
}

/// Extract the job id from `sbatch` stdout, with or without `--parsable`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    if let Some(caps) = SUBMITTED_BATCH_JOB.captures(stdout) {
        return Some(caps[1].to_string());
    }

    // --parsable prints `<id>` or `<id>;<cluster>`
    let first = stdout.trim().split(';').next()?.trim();
    if !first.is_empty() && first.chars().all(|c| c.is_ascii_digit()) {
        Some(first.to_string())
    } else {
        None
    }
}

/// Submission that was intercepted in debug mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunSubmission {
    pub job: JobSpec,
    pub after: Dependency,
}

/// Stand-in submitter: every call succeeds with [`FAKE_JOB_ID`] and nothing
/// reaches a scheduler.
#[derive(Debug, Default)]
pub struct DryRunSubmitter {
    submissions: Mutex<Vec<DryRunSubmission>>,
}

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything that would have been queued, in submission order.
    pub fn submissions(&self) -> Vec<DryRunSubmission> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Submitter for DryRunSubmitter {
    fn submit(&self, job: &JobSpec, after: &Dependency) -> Result<JobHandle, SubmitError> {
        tracing::info!(
            job = %job.name,
            script = %job.script.display(),
            after = %after,
            "dry run, not submitting"
        );
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DryRunSubmission {
                job: job.clone(),
                after: after.clone(),
            });
        Ok(JobHandle::dry_run(FAKE_JOB_ID))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
