//! Execution Context: state handed to a stage for the duration of one call.
use std::cell::RefCell;

use crate::cli_args::CliArgs;
use crate::config::Config;
use crate::report::JobRecord;
use crate::stage::StageError;
use crate::submit::{JobSpec, Submitter};
use crate::token::Dependency;

pub struct StageContext<'a> {
    pub run_id: &'a str,
    pub config: &'a Config,
    /// Present only for stages that take the flattened args.
    pub cli_args: Option<&'a CliArgs>,
    submitter: &'a dyn Submitter,
    jobs: RefCell<Vec<JobRecord>>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        run_id: &'a str,
        config: &'a Config,
        cli_args: Option<&'a CliArgs>,
        submitter: &'a dyn Submitter,
    ) -> Self {
        Self {
            run_id,
            config,
            cli_args,
            submitter,
            jobs: RefCell::new(Vec::new()),
        }
    }

    /// Queue `job` behind `after` and return the new token.
    pub fn submit(&self, job: JobSpec, after: Dependency) -> Result<Dependency, StageError> {
        let handle = self.submitter.submit(&job, &after)?;
        tracing::info!(job = %job.name, id = %handle, after = %after, "submitted job");
        self.jobs.borrow_mut().push(JobRecord::new(&job, handle.clone()));
        Ok(Dependency::Submitted(handle))
    }

    /// Jobs submitted through this context so far.
    pub fn take_jobs(&self) -> Vec<JobRecord> {
        self.jobs.take()
    }
}
