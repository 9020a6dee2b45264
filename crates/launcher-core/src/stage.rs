//! Stage trait: one contract for every submittable pipeline stage.
use thiserror::Error;

use crate::config::Config;
use crate::context::StageContext;
use crate::resolve::{DatasetFamily, ModelFamily};
use crate::submit::SubmitError;
use crate::token::Dependency;

pub trait Stage: Send + Sync {
    /// Unique stage id (e.g. "data_preparation.pile")
    fn id(&self) -> &'static str;

    /// Whether the stage receives the flattened CLI args of the whole config.
    fn uses_cli_args(&self) -> bool {
        true
    }

    /// Export follow-ups are queued only when this holds for the launched
    /// config. Pipeline stages are driven by their `run_*` flag instead.
    fn is_enabled(&self, _config: &Config) -> bool {
        true
    }

    /// Submit this stage's work behind `dependency` and return the token
    /// the next stage has to wait for.
    fn run(&self, ctx: &StageContext<'_>, dependency: Dependency) -> Result<Dependency, StageError>;
}

/// Concrete implementations for each slot of the pipeline.
pub trait StageCatalog {
    fn data_preparation(&self, family: DatasetFamily) -> &dyn Stage;
    fn training(&self) -> &dyn Stage;
    fn conversion(&self) -> &dyn Stage;
    fn finetuning(&self) -> &dyn Stage;
    fn prompt_learning(&self) -> &dyn Stage;
    fn evaluation(&self, family: ModelFamily) -> &dyn Stage;
    fn export(&self) -> &dyn Stage;
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("STAGE/CONFIG: {0}")]
    InvalidConfig(String),

    #[error("STAGE/RENDER: {0}")]
    Render(String),

    #[error("STAGE/IO: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Submit(#[from] SubmitError),
}
