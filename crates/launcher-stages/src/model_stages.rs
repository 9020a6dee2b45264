//! Single-job stages driven by the whole flattened config: training,
//! checkpoint conversion, finetuning and prompt learning.

use launcher_core::{Dependency, Stage, StageContext, StageError};

use crate::script::{shared_args, ScriptJob};

pub struct ScriptStage {
    id: &'static str,
    block: &'static str,
    step: &'static str,
    entry: &'static str,
}

impl ScriptStage {
    pub const fn new(id: &'static str, block: &'static str, step: &'static str, entry: &'static str) -> Self {
        Self {
            id,
            block,
            step,
            entry,
        }
    }

    pub fn training() -> Self {
        Self::new("training", "training", "train", "training/train.py")
    }

    pub fn conversion() -> Self {
        Self::new("conversion", "conversion", "convert", "conversion/convert.py")
    }

    pub fn finetuning() -> Self {
        Self::new("finetuning", "finetuning", "finetune", "finetuning/finetune.py")
    }

    pub fn prompt_learning() -> Self {
        Self::new(
            "prompt_learning",
            "prompt_learning",
            "prompt_learn",
            "prompt_learning/prompt_learn.py",
        )
    }
}

impl Stage for ScriptStage {
    fn id(&self) -> &'static str {
        self.id
    }

    fn run(&self, ctx: &StageContext<'_>, dependency: Dependency) -> Result<Dependency, StageError> {
        ScriptJob {
            block: self.block,
            step: self.step,
            entry: self.entry,
            args: shared_args(ctx)?,
        }
        .submit(ctx, dependency)
    }
}
