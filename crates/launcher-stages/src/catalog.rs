//! Stage Catalog: default wiring of concrete stages into pipeline slots.
use launcher_core::{DatasetFamily, ModelFamily, Stage, StageCatalog};

use crate::data_preparation::DataPreparationStage;
use crate::evaluation::EvaluationStage;
use crate::export::ExportStage;
use crate::model_stages::ScriptStage;

pub struct DefaultCatalog {
    pile: DataPreparationStage,
    mc4: DataPreparationStage,
    custom: DataPreparationStage,
    training: ScriptStage,
    conversion: ScriptStage,
    finetuning: ScriptStage,
    prompt_learning: ScriptStage,
    eval_prompt_gpt3: EvaluationStage,
    eval_gpt3: EvaluationStage,
    eval_t5: EvaluationStage,
    export: ExportStage,
}

impl DefaultCatalog {
    pub fn new() -> Self {
        Self {
            pile: DataPreparationStage::new(DatasetFamily::Pile),
            mc4: DataPreparationStage::new(DatasetFamily::Mc4),
            custom: DataPreparationStage::new(DatasetFamily::Custom),
            training: ScriptStage::training(),
            conversion: ScriptStage::conversion(),
            finetuning: ScriptStage::finetuning(),
            prompt_learning: ScriptStage::prompt_learning(),
            eval_prompt_gpt3: EvaluationStage::new(ModelFamily::PromptGpt3),
            eval_gpt3: EvaluationStage::new(ModelFamily::Gpt3),
            eval_t5: EvaluationStage::new(ModelFamily::T5),
            export: ExportStage,
        }
    }
}

impl Default for DefaultCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StageCatalog for DefaultCatalog {
    fn data_preparation(&self, family: DatasetFamily) -> &dyn Stage {
        match family {
            DatasetFamily::Pile => &self.pile,
            DatasetFamily::Mc4 => &self.mc4,
            DatasetFamily::Custom => &self.custom,
        }
    }

    fn training(&self) -> &dyn Stage {
        &self.training
    }

    fn conversion(&self) -> &dyn Stage {
        &self.conversion
    }

    fn finetuning(&self) -> &dyn Stage {
        &self.finetuning
    }

    fn prompt_learning(&self) -> &dyn Stage {
        &self.prompt_learning
    }

    fn evaluation(&self, family: ModelFamily) -> &dyn Stage {
        match family {
            ModelFamily::PromptGpt3 => &self.eval_prompt_gpt3,
            ModelFamily::Gpt3 => &self.eval_gpt3,
            ModelFamily::T5 => &self.eval_t5,
        }
    }

    fn export(&self) -> &dyn Stage {
        &self.export
    }
}
