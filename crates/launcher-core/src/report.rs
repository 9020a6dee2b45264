//! Launch report: what was submitted, in which order, behind which job.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::Config;
use crate::resolve::{DatasetFamily, ModelFamily};
use crate::selector::StageKind;
use crate::submit::JobSpec;
use crate::token::{Dependency, JobHandle};

#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub dataset: DatasetFamily,
    pub model: ModelFamily,
    pub stages: Vec<StageRecord>,
    /// Token of the last job submitted in the chain.
    pub dependency: Dependency,
    /// Input config minus the blocks of disabled stages.
    pub active_config: Config,
}

impl LaunchReport {
    /// Stages that were actually invoked, in order.
    pub fn invoked(&self) -> Vec<StageKind> {
        self.stages.iter().map(|record| record.stage).collect()
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|record| record.jobs.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub id: String,
    /// Token the stage was asked to wait on.
    pub after: Dependency,
    /// Token the stage handed back.
    pub produced: Dependency,
    pub jobs: Vec<JobRecord>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub name: String,
    pub script: PathBuf,
    pub script_hash: String,
    pub handle: JobHandle,
}

impl JobRecord {
    pub fn new(job: &JobSpec, handle: JobHandle) -> Self {
        Self {
            name: job.name.clone(),
            script: job.script.clone(),
            script_hash: hash_script(&job.body),
            handle,
        }
    }
}

pub fn hash_script(body: &str) -> String {
    format!("blake3:{}", blake3::hash(body.as_bytes()))
}
