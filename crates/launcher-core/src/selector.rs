//! Stage Selector: stage table and run flags.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    DataPreparation,
    Training,
    Conversion,
    Finetuning,
    PromptLearning,
    Evaluation,
    Export,
}

/// Static description of one pipeline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub run_flag: &'static str,
    pub config_key: &'static str,
}

/// Submission order. Each stage waits on the one submitted before it.
pub static STAGES: [StageDescriptor; 7] = [
    StageDescriptor {
        kind: StageKind::DataPreparation,
        run_flag: "run_data_preparation",
        config_key: "data_preparation",
    },
    StageDescriptor {
        kind: StageKind::Training,
        run_flag: "run_training",
        config_key: "training",
    },
    StageDescriptor {
        kind: StageKind::Conversion,
        run_flag: "run_conversion",
        config_key: "conversion",
    },
    StageDescriptor {
        kind: StageKind::Finetuning,
        run_flag: "run_finetuning",
        config_key: "finetuning",
    },
    StageDescriptor {
        kind: StageKind::PromptLearning,
        run_flag: "run_prompt_learning",
        config_key: "prompt_learning",
    },
    StageDescriptor {
        kind: StageKind::Evaluation,
        run_flag: "run_evaluation",
        config_key: "evaluation",
    },
    StageDescriptor {
        kind: StageKind::Export,
        run_flag: "run_export",
        config_key: "export",
    },
];

impl StageKind {
    pub fn descriptor(self) -> &'static StageDescriptor {
        &STAGES[self as usize]
    }

    pub fn config_key(self) -> &'static str {
        self.descriptor().config_key
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Which stages are switched on for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    enabled: [bool; 7],
}

impl RunFlags {
    pub fn from_config(config: &Config) -> Self {
        let mut flags = Self::default();
        for stage in &STAGES {
            flags.enabled[stage.kind as usize] = config.flag(stage.run_flag);
        }
        flags
    }

    pub fn all() -> Self {
        Self { enabled: [true; 7] }
    }

    pub fn with(mut self, kind: StageKind, enabled: bool) -> Self {
        self.enabled[kind as usize] = enabled;
        self
    }

    pub fn is_enabled(&self, kind: StageKind) -> bool {
        self.enabled[kind as usize]
    }

    pub fn enabled(&self) -> impl Iterator<Item = StageKind> + '_ {
        STAGES
            .iter()
            .map(|stage| stage.kind)
            .filter(move |kind| self.is_enabled(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_enum_order() {
        for (index, stage) in STAGES.iter().enumerate() {
            assert_eq!(stage.kind as usize, index);
            assert_eq!(stage.run_flag, format!("run_{}", stage.config_key));
        }
    }

    #[test]
    fn test_flags_from_config() {
        let config = Config::from_yaml(
            "run_data_preparation: true\nrun_training: true\nrun_conversion: false\nrun_finetuning: true\n",
        )
        .unwrap();
        let flags = RunFlags::from_config(&config);
        assert_eq!(
            flags.enabled().collect::<Vec<_>>(),
            vec![StageKind::DataPreparation, StageKind::Training, StageKind::Finetuning]
        );
    }

    #[test]
    fn test_empty_config_disables_everything() {
        let flags = RunFlags::from_config(&Config::default());
        assert_eq!(flags.enabled().count(), 0);
        assert_eq!(RunFlags::all().with(StageKind::Export, false).enabled().count(), 6);
    }
}
