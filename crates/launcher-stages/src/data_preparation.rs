//! Data preparation: download and preprocess one dataset family.
//!
//! Each family is a short list of steps. A step runs only when its switch
//! is set in the `data_preparation` block, and every step waits on the one
//! before it, so the stage hands back the token of its last job.

use launcher_core::{DatasetFamily, Dependency, Stage, StageContext, StageError};

use crate::script::{block_flag, shared_args, ScriptJob};

const BLOCK: &str = "data_preparation";

/// One job within the stage.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    /// Switch inside the `data_preparation` block.
    pub flag: &'static str,
    pub name: &'static str,
    pub entry: &'static str,
}

const PILE_STEPS: &[Step] = &[
    Step {
        flag: "download_the_pile",
        name: "download",
        entry: "data_preparation/pile/download.py",
    },
    Step {
        flag: "preprocess_data",
        name: "preprocess",
        entry: "data_preparation/pile/preprocess.py",
    },
];

const MC4_STEPS: &[Step] = &[
    Step {
        flag: "download_mc4",
        name: "download",
        entry: "data_preparation/mc4/download.py",
    },
    Step {
        flag: "preprocess_data",
        name: "preprocess",
        entry: "data_preparation/mc4/preprocess.py",
    },
];

const CUSTOM_STEPS: &[Step] = &[
    Step {
        flag: "train_tokenizer",
        name: "tokenizer",
        entry: "data_preparation/custom/train_tokenizer.py",
    },
    Step {
        flag: "preprocess_data",
        name: "preprocess",
        entry: "data_preparation/custom/preprocess.py",
    },
];

pub struct DataPreparationStage {
    family: DatasetFamily,
}

impl DataPreparationStage {
    pub fn new(family: DatasetFamily) -> Self {
        Self { family }
    }

    pub fn steps(&self) -> &'static [Step] {
        match self.family {
            DatasetFamily::Pile => PILE_STEPS,
            DatasetFamily::Mc4 => MC4_STEPS,
            DatasetFamily::Custom => CUSTOM_STEPS,
        }
    }
}

impl Stage for DataPreparationStage {
    fn id(&self) -> &'static str {
        match self.family {
            DatasetFamily::Pile => "data_preparation.pile",
            DatasetFamily::Mc4 => "data_preparation.mc4",
            DatasetFamily::Custom => "data_preparation.custom",
        }
    }

    fn run(&self, ctx: &StageContext<'_>, dependency: Dependency) -> Result<Dependency, StageError> {
        let args = shared_args(ctx)?;
        let mut dependency = dependency;

        for step in self.steps() {
            if !block_flag(ctx, BLOCK, step.flag) {
                tracing::debug!(stage = self.id(), step = step.name, "step switched off");
                continue;
            }
            dependency = ScriptJob {
                block: BLOCK,
                step: step.name,
                entry: step.entry,
                args: args.clone(),
            }
            .submit(ctx, dependency)?;
        }

        Ok(dependency)
    }
}
