//! Launcher stages: the concrete jobs behind each pipeline slot.
//!
//! Every stage renders one or more sbatch scripts and submits them through
//! the context's submitter, chained on the incoming dependency.
//!
//! # Pipeline Flow
//!
//! ```text
//! data_preparation → training → conversion → finetuning → prompt_learning → evaluation → export
//!   (pile|mc4|custom)                                                 (prompt_gpt3|gpt3|t5)   ↓
//!                                                                                  accuracy / performance
//! ```

mod catalog;
mod data_preparation;
mod evaluation;
mod export;
mod model_stages;
pub mod script;

pub use catalog::DefaultCatalog;
pub use data_preparation::{DataPreparationStage, Step};
pub use evaluation::EvaluationStage;
pub use export::{ExportCheck, ExportStage};
pub use model_stages::ScriptStage;

use launcher_core::{Launcher, Submitter};
use std::sync::Arc;

// ============================================================================
// CONVENIENCE BUILDERS
// ============================================================================

/// Launcher over the default stages. Each export check runs behind export
/// when its switch is on in the `export` block of the launched config.
pub fn default_launcher(submitter: Arc<dyn Submitter>) -> Launcher<DefaultCatalog> {
    ExportCheck::ALL
        .into_iter()
        .fold(Launcher::new(DefaultCatalog::new(), submitter), |launcher, check| {
            launcher.with_export_follow_up(Box::new(check))
        })
}

/// Same as [`default_launcher`] submitting through `sbatch`.
pub fn slurm_launcher() -> Launcher<DefaultCatalog> {
    default_launcher(Arc::new(launcher_core::SlurmSubmitter::new()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use launcher_core::{
        Config, Dependency, JobHandle, JobSpec, StageKind, SubmitError, FAKE_JOB_ID,
    };
    use std::path::Path;
    use std::sync::Mutex;

    /// Records `(job name, waited-on id)` and hands out ids 1, 2, 3...
    #[derive(Default)]
    struct SequenceSubmitter {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl Submitter for SequenceSubmitter {
        fn submit(&self, job: &JobSpec, after: &Dependency) -> Result<JobHandle, SubmitError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push((job.name.clone(), after.handle().map(|h| h.id().to_string())));
            Ok(JobHandle::new(seen.len().to_string()))
        }
    }

    fn config(results: &Path, extra: &str) -> Config {
        Config::from_yaml(&format!(
            "launcher_scripts_path: /opt/launcher\n\
             base_results_dir: {}\n\
             data_config: download_gpt3_pile\n\
             evaluation_config: gpt3/evaluate_all\n\
             {}\n\
             data_preparation:\n  download_the_pile: true\n  preprocess_data: true\n  run:\n    name: pile\n\
             training:\n  run:\n    name: gpt3_5b\n    nodes: 20\n\
             conversion:\n  run:\n    name: convert_gpt3\n\
             finetuning:\n  run:\n    name: squad\n\
             prompt_learning:\n  run:\n    name: prompt_squad\n\
             evaluation:\n  tasks: all_tasks\n  run:\n    name: eval_all\n\
             export:\n  run_accuracy: true\n  run:\n    name: export_ft\n",
            results.display(),
            extra
        ))
        .unwrap()
    }

    #[test]
    fn test_data_preparation_chains_steps() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let config = config(dir.path(), "run_data_preparation: true\nrun_training: true");

        let report = default_launcher(submitter.clone()).launch(&config).unwrap();

        let seen = submitter.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("pile_download".to_string(), None),
                ("pile_preprocess".to_string(), Some("1".to_string())),
                ("gpt3_5b_train".to_string(), Some("2".to_string())),
            ]
        );
        assert_eq!(report.stages[0].jobs.len(), 2);
        assert_eq!(report.dependency, Dependency::Submitted(JobHandle::new("3")));
    }

    #[test]
    fn test_data_preparation_steps_switched_off() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let mut config = config(dir.path(), "run_data_preparation: true\nrun_training: true");
        config.apply_override("data_preparation.download_the_pile=false").unwrap();
        config.apply_override("data_preparation.preprocess_data=false").unwrap();

        let report = default_launcher(submitter.clone()).launch(&config).unwrap();

        assert!(report.stages[0].jobs.is_empty());
        assert_eq!(report.stages[0].produced, Dependency::NotStarted);
        let seen = submitter.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("gpt3_5b_train".to_string(), None)]);
    }

    #[test]
    fn test_debug_run_writes_scripts_only() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let config = config(
            dir.path(),
            "debug: true\nrun_data_preparation: true\nrun_training: true\nrun_conversion: true\n\
             run_finetuning: true\nrun_prompt_learning: true\nrun_evaluation: true\nrun_export: true",
        );

        let report = default_launcher(submitter.clone()).launch(&config).unwrap();

        assert!(submitter.seen.lock().unwrap().is_empty());
        assert!(report.dry_run);
        // seven stages plus the accuracy check behind export
        assert_eq!(report.stages.len(), 8);
        assert_eq!(report.job_count(), 9);
        for record in &report.stages {
            for job in &record.jobs {
                assert!(job.script.exists(), "{} not written", job.script.display());
                assert_eq!(job.handle.id(), FAKE_JOB_ID);
            }
        }
        assert_eq!(report.stages[6].stage, StageKind::Export);
        assert_eq!(report.stages[7].id, "export.accuracy");
    }

    #[test]
    fn test_gpt3_evaluation_gets_block_args() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let config = config(dir.path(), "run_evaluation: true");

        let report = default_launcher(submitter).launch(&config).unwrap();

        let script = std::fs::read_to_string(&report.stages[0].jobs[0].script).unwrap();
        assert!(script.contains(&format!(
            "/opt/launcher/evaluation/gpt3/evaluate.py {} {}",
            shlex::try_quote("tasks=all_tasks").unwrap(),
            shlex::try_quote("run.name=eval_all").unwrap(),
        )));
        assert!(!script.contains("data_config="));
    }

    #[test]
    fn test_t5_evaluation_gets_shared_args() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let mut config = config(dir.path(), "run_evaluation: true");
        config.apply_override("evaluation_config=t5/squad").unwrap();

        let report = default_launcher(submitter).launch(&config).unwrap();

        assert_eq!(report.stages[0].id, "evaluation.t5");
        let script = std::fs::read_to_string(&report.stages[0].jobs[0].script).unwrap();
        assert!(script.contains("evaluation_config=t5/squad"));
        assert!(script.contains("training.run.nodes=20"));
    }

    #[test]
    fn test_training_script_layout() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let config = config(dir.path(), "run_training: true");

        let report = default_launcher(submitter).launch(&config).unwrap();

        let job = &report.stages[0].jobs[0];
        assert_eq!(job.script, dir.path().join("gpt3_5b").join("gpt3_5b_train.sh"));
        let script = std::fs::read_to_string(&job.script).unwrap();
        assert!(script.contains("#SBATCH --nodes=20\n"));
        assert!(script.contains(&format!(
            "python3 -u /opt/launcher/training/train.py {} ",
            shlex::try_quote("launcher_scripts_path=/opt/launcher").unwrap()
        )));
        assert!(script.contains(&format!(" {} ", shlex::try_quote("run_training=true").unwrap())));
    }

    #[test]
    fn test_follow_ups_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "run_export: true");
        config.apply_override("export.run_accuracy=false").unwrap();
        config.apply_override("export.run_performance=true").unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());

        let report = default_launcher(submitter.clone()).launch(&config).unwrap();

        let ids: Vec<_> = report.stages.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["export", "export.performance"]);
        let seen = submitter.seen.lock().unwrap().clone();
        assert_eq!(seen[1], ("export_ft_performance".to_string(), Some("1".to_string())));
        assert_eq!(report.dependency, Dependency::Submitted(JobHandle::new("1")));
    }

    #[test]
    fn test_follow_ups_follow_the_launched_config() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let launcher = default_launcher(submitter.clone());

        let mut off = config(dir.path(), "run_export: true");
        off.apply_override("export.run_accuracy=false").unwrap();
        let report = launcher.launch(&off).unwrap();
        let ids: Vec<_> = report.stages.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["export"]);

        let on = config(dir.path(), "run_export: true");
        let report = launcher.launch(&on).unwrap();
        let ids: Vec<_> = report.stages.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["export", "export.accuracy"]);
        let seen = submitter.seen.lock().unwrap().clone();
        assert_eq!(seen.last().unwrap().0, "export_ft_accuracy");
    }

    #[test]
    fn test_interpolated_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(SequenceSubmitter::default());
        let mut config = config(dir.path(), "run_training: true\nrun_conversion: true");
        config
            .apply_override("training.run.results_dir=${base_results_dir}/custom/${.name}")
            .unwrap();
        config
            .apply_override("conversion.model.ckpt=${training.run.results_dir}/checkpoints")
            .unwrap();

        let report = default_launcher(submitter).launch(&config).unwrap();

        let training = &report.stages[0].jobs[0];
        assert_eq!(training.script, dir.path().join("custom/gpt3_5b/gpt3_5b_train.sh"));
        let conversion = std::fs::read_to_string(&report.stages[1].jobs[0].script).unwrap();
        let ckpt = format!("conversion.model.ckpt={}/custom/gpt3_5b/checkpoints", dir.path().display());
        assert!(conversion.contains(shlex::try_quote(&ckpt).unwrap().as_ref()));
    }
}
