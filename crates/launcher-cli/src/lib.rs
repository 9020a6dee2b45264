//! Command line for the launcher: compose the config, apply overrides,
//! submit the pipeline and optionally write out what was submitted.
use anyhow::Context;
use clap::Parser;
use launcher_core::{Config, LaunchReport, SlurmSubmitter};
use serde_yaml::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "launcher")]
#[command(about = "Submit a configured ML pipeline as a chain of dependent batch jobs")]
#[command(version)]
pub struct Cli {
    /// Directory holding the primary config and its groups
    #[arg(long, default_value = "conf", env = "LAUNCHER_CONFIG_DIR")]
    pub config_dir: PathBuf,

    /// Primary config file name, without `.yaml`
    #[arg(long, default_value = "config")]
    pub config_name: String,

    /// Overrides in `dotted.key=value` form; `group=option` picks a config group file
    pub overrides: Vec<String>,

    /// Render scripts but never call the scheduler (same as `debug=true`)
    #[arg(long)]
    pub debug: bool,

    /// Print the config left after dropping disabled stages
    #[arg(long)]
    pub print_active_config: bool,

    /// Write the launch report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Submission program
    #[arg(long, default_value = "sbatch", env = "LAUNCHER_SBATCH")]
    pub sbatch: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

/// Build the effective configuration from the command line.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::compose_with(&cli.config_dir, &cli.config_name, cli.overrides.as_slice())
        .with_context(|| {
            format!(
                "failed to compose `{}` from {}",
                cli.config_name,
                cli.config_dir.display()
            )
        })?;

    if cli.debug {
        config.set_path("debug", Value::Bool(true))?;
    }
    Ok(config)
}

pub fn run(cli: &Cli) -> anyhow::Result<LaunchReport> {
    let config = load_config(cli)?;
    let submitter = Arc::new(SlurmSubmitter::with_program(cli.sbatch.as_str()));
    let report = launcher_stages::default_launcher(submitter).launch(&config)?;

    if cli.print_active_config {
        print!("{}", report.active_config.to_yaml()?);
    }
    if let Some(path) = &cli.report {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote launch report");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use launcher_core::{Dependency, LauncherError, StageKind};
    use std::fs;
    use std::path::Path;

    fn write_conf(dir: &Path, results: &Path) {
        fs::create_dir_all(dir.join("training")).unwrap();
        fs::write(
            dir.join("config.yaml"),
            format!(
                "defaults:\n  - training: gpt3_126m\n\
                 run_data_preparation: false\nrun_training: true\nrun_export: false\n\
                 data_config: download_gpt3_pile\nevaluation_config: gpt3/evaluate_all\n\
                 launcher_scripts_path: /opt/launcher\nbase_results_dir: {}\n\
                 export:\n  run:\n    name: export\n",
                results.display()
            ),
        )
        .unwrap();
        fs::write(
            dir.join("training/gpt3_126m.yaml"),
            "run:\n  name: gpt3_126m\n  nodes: 2\n",
        )
        .unwrap();
    }

    fn cli(conf: &Path, args: &[&str]) -> Cli {
        let mut argv = vec!["launcher".to_string(), "--config-dir".to_string(), conf.display().to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        Cli::parse_from(argv)
    }

    #[test]
    fn test_debug_flag_dry_runs() {
        let conf = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        write_conf(conf.path(), results.path());
        let report_path = results.path().join("report.json");

        let report = run(&cli(
            conf.path(),
            &["--debug", "--sbatch", "no-such-sbatch", "--report", report_path.to_str().unwrap()],
        ))
        .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.invoked(), vec![StageKind::Training]);
        assert!(matches!(report.dependency, Dependency::Submitted(_)));
        assert!(!report.active_config.contains("export"));
        assert!(report.active_config.contains("training"));

        let written = fs::read_to_string(&report_path).unwrap();
        assert!(written.contains("\"dry_run\": true"));
    }

    #[test]
    fn test_overrides_applied_in_order() {
        let conf = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        write_conf(conf.path(), results.path());

        let config = load_config(&cli(
            conf.path(),
            &["training.run.nodes=16", "run_export=true", "training.run.nodes=32"],
        ))
        .unwrap();

        assert_eq!(config.get_path("training.run.nodes").unwrap().as_u64(), Some(32));
        assert!(config.flag("run_export"));
        assert!(!config.flag("debug"));
    }

    #[test]
    fn test_group_override_switches_model() {
        let conf = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        write_conf(conf.path(), results.path());
        fs::write(
            conf.path().join("training/gpt3_5b.yaml"),
            "run:\n  name: gpt3_5b\n  nodes: 20\n",
        )
        .unwrap();

        let report = run(&cli(conf.path(), &["--debug", "training=gpt3_5b"])).unwrap();

        let job = &report.stages[0].jobs[0];
        assert_eq!(job.name, "gpt3_5b_train");
        assert_eq!(
            report.active_config.get_path("training.run.nodes").unwrap().as_u64(),
            Some(20)
        );
    }

    #[test]
    fn test_unknown_dataset_is_fatal() {
        let conf = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        write_conf(conf.path(), results.path());

        let err = run(&cli(conf.path(), &["--debug", "data_config=unknown-dataset"])).unwrap_err();

        let launcher_err = err.downcast_ref::<LauncherError>().unwrap();
        assert!(matches!(launcher_err, LauncherError::UnrecognizedDataset(d) if d == "unknown-dataset"));
        assert!(err.to_string().contains("unknown-dataset"));
    }

    #[test]
    fn test_real_submitter_failure_surfaces() {
        let conf = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        write_conf(conf.path(), results.path());

        let err = run(&cli(conf.path(), &["--sbatch", "definitely-not-a-real-sbatch-binary"])).unwrap_err();

        let launcher_err = err.downcast_ref::<LauncherError>().unwrap();
        assert!(matches!(launcher_err, LauncherError::Stage { stage: StageKind::Training, .. }));
    }
}
