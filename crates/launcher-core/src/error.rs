//! Unified Error Model
use thiserror::Error;

use crate::selector::StageKind;
use crate::stage::StageError;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Unrecognized dataset in data config `{0}`.")]
    UnrecognizedDataset(String),

    #[error("Unrecognized model in evaluation config `{0}`.")]
    UnrecognizedModel(String),

    #[error("CONFIG/missing field `{0}`")]
    MissingField(String),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("STAGE/{stage}: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },
}

impl From<serde_yaml::Error> for LauncherError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}
