//! Launcher Core: Stage Trait, Dependency Chaining, Launch Driver
//!
//! A launch reads one configuration, decides which of the seven pipeline
//! stages to submit and threads each stage's job handle into the next
//! submission so the scheduler runs them one after another.

pub mod cli_args;
pub mod config;
pub mod context;
pub mod error;
mod interpolate;
pub mod report;
pub mod resolve;
pub mod runner;
pub mod selector;
pub mod stage;
pub mod submit;
pub mod token;

pub use cli_args::CliArgs;
pub use config::Config;
pub use context::StageContext;
pub use error::LauncherError;
pub use report::{JobRecord, LaunchReport, StageRecord};
pub use resolve::{DatasetFamily, ModelFamily};
pub use runner::Launcher;
pub use selector::{RunFlags, StageDescriptor, StageKind, STAGES};
pub use stage::{Stage, StageCatalog, StageError};
pub use submit::{DryRunSubmitter, JobSpec, SlurmSubmitter, SubmitError, Submitter, FAKE_JOB_ID};
pub use token::{Dependency, JobHandle};
