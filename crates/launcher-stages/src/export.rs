//! Export: inference-format export plus optional checks queued behind it.
use launcher_core::{Config, Dependency, Stage, StageContext, StageError};

use crate::script::{block_args, ScriptJob};

const BLOCK: &str = "export";

#[derive(Default)]
pub struct ExportStage;

impl Stage for ExportStage {
    fn id(&self) -> &'static str {
        "export"
    }

    fn uses_cli_args(&self) -> bool {
        false
    }

    fn run(&self, ctx: &StageContext<'_>, dependency: Dependency) -> Result<Dependency, StageError> {
        ScriptJob {
            block: BLOCK,
            step: "export",
            entry: "export/export.py",
            args: block_args(ctx, BLOCK),
        }
        .submit(ctx, dependency)
    }
}

/// Post-export checks on the exported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportCheck {
    Accuracy,
    Performance,
}

impl ExportCheck {
    pub const ALL: [ExportCheck; 2] = [ExportCheck::Accuracy, ExportCheck::Performance];

    /// Switch inside the `export` block that turns the check on.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Accuracy => "run_accuracy",
            Self::Performance => "run_performance",
        }
    }

    fn step(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Performance => "performance",
        }
    }
}

impl Stage for ExportCheck {
    fn id(&self) -> &'static str {
        match self {
            Self::Accuracy => "export.accuracy",
            Self::Performance => "export.performance",
        }
    }

    fn uses_cli_args(&self) -> bool {
        false
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config
            .get_path(&format!("{BLOCK}.{}", self.flag()))
            .and_then(serde_yaml::Value::as_bool)
            .unwrap_or(false)
    }

    fn run(&self, ctx: &StageContext<'_>, dependency: Dependency) -> Result<Dependency, StageError> {
        let entry = match self {
            Self::Accuracy => "export/accuracy.py",
            Self::Performance => "export/performance.py",
        };
        ScriptJob {
            block: BLOCK,
            step: self.step(),
            entry,
            args: block_args(ctx, BLOCK),
        }
        .submit(ctx, dependency)
    }
}
