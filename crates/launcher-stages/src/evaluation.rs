//! Evaluation: one job per model family.
//!
//! GPT-3 style evaluations are parameterized only by the `evaluation`
//! block; T5 evaluation receives the whole flattened config.

use launcher_core::{Dependency, ModelFamily, Stage, StageContext, StageError};

use crate::script::{block_args, shared_args, ScriptJob};

const BLOCK: &str = "evaluation";

pub struct EvaluationStage {
    family: ModelFamily,
}

impl EvaluationStage {
    pub fn new(family: ModelFamily) -> Self {
        Self { family }
    }

    fn entry(&self) -> &'static str {
        match self.family {
            ModelFamily::PromptGpt3 => "evaluation/prompt_gpt3/evaluate.py",
            ModelFamily::Gpt3 => "evaluation/gpt3/evaluate.py",
            ModelFamily::T5 => "evaluation/t5/evaluate.py",
        }
    }
}

impl Stage for EvaluationStage {
    fn id(&self) -> &'static str {
        match self.family {
            ModelFamily::PromptGpt3 => "evaluation.prompt_gpt3",
            ModelFamily::Gpt3 => "evaluation.gpt3",
            ModelFamily::T5 => "evaluation.t5",
        }
    }

    fn uses_cli_args(&self) -> bool {
        self.family == ModelFamily::T5
    }

    fn run(&self, ctx: &StageContext<'_>, dependency: Dependency) -> Result<Dependency, StageError> {
        let args = if self.uses_cli_args() {
            shared_args(ctx)?
        } else {
            block_args(ctx, BLOCK)
        };

        ScriptJob {
            block: BLOCK,
            step: "evaluate",
            entry: self.entry(),
            args,
        }
        .submit(ctx, dependency)
    }
}
