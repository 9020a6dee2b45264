//! Dependency Tokens: threaded from one submitted stage to the next.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler-side identity of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    dry_run: bool,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dry_run: false,
        }
    }

    /// Handle that was never seen by a scheduler.
    pub fn dry_run(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dry_run: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// What the next submission has to wait for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "job", rename_all = "snake_case")]
pub enum Dependency {
    /// Nothing submitted yet in this run.
    #[default]
    NotStarted,
    Submitted(JobHandle),
}

impl Dependency {
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Self::NotStarted => None,
            Self::Submitted(handle) => Some(handle),
        }
    }
}

impl From<JobHandle> for Dependency {
    fn from(handle: JobHandle) -> Self {
        Self::Submitted(handle)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("none"),
            Self::Submitted(handle) => write!(f, "job {handle}"),
        }
    }
}
