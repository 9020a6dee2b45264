//! Pipeline Launcher: walks the stage table and chains each submission on the last.
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::cli_args::CliArgs;
use crate::config::Config;
use crate::context::StageContext;
use crate::error::LauncherError;
use crate::report::{LaunchReport, StageRecord};
use crate::resolve::{DatasetFamily, ModelFamily};
use crate::selector::{RunFlags, StageKind, STAGES};
use crate::stage::{Stage, StageCatalog};
use crate::submit::{DryRunSubmitter, Submitter};
use crate::token::Dependency;

pub struct Launcher<C> {
    catalog: C,
    submitter: Arc<dyn Submitter>,
    export_follow_ups: Vec<Box<dyn Stage>>,
}

/// Everything a single stage call needs besides the stage itself.
struct Invocation<'a> {
    run_id: &'a str,
    config: &'a Config,
    cli_args: &'a CliArgs,
    submitter: &'a dyn Submitter,
}

impl<C: StageCatalog> Launcher<C> {
    pub fn new(catalog: C, submitter: Arc<dyn Submitter>) -> Self {
        Self {
            catalog,
            submitter,
            export_follow_ups: Vec::new(),
        }
    }

    /// Register an extra job behind export (accuracy or performance checks).
    /// It runs when [`Stage::is_enabled`] holds for the launched config, waits
    /// on export's job and does not move the chain's final token.
    pub fn with_export_follow_up(mut self, stage: Box<dyn Stage>) -> Self {
        self.export_follow_ups.push(stage);
        self
    }

    /// Submit every enabled stage of `config` in pipeline order.
    ///
    /// Both descriptors are resolved before anything is submitted, so a bad
    /// `data_config` or `evaluation_config` aborts the run even when the
    /// matching stage is switched off. Interpolations are resolved against
    /// the full config before any block is dropped.
    pub fn launch(&self, config: &Config) -> Result<LaunchReport, LauncherError> {
        let resolved = config.resolved()?;
        let config = &resolved;
        let cli_args = CliArgs::from_config(config);

        let dry_run = DryRunSubmitter::new();
        let submitter: &dyn Submitter = if config.flag("debug") {
            tracing::warn!("debug mode: job submission replaced by a dry run");
            &dry_run
        } else {
            self.submitter.as_ref()
        };

        let dataset = DatasetFamily::resolve(config.descriptor("data_config")?)?;
        let model = ModelFamily::resolve(config.descriptor("evaluation_config")?)?;
        let flags = RunFlags::from_config(config);

        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%run_id, %dataset, %model, dry_run = submitter.is_dry_run(), "launching pipeline");

        let invocation = Invocation {
            run_id: &run_id,
            config,
            cli_args: &cli_args,
            submitter,
        };

        let mut report = LaunchReport {
            run_id: run_id.clone(),
            started_at: Utc::now(),
            dry_run: submitter.is_dry_run(),
            dataset,
            model,
            stages: Vec::new(),
            dependency: Dependency::NotStarted,
            active_config: config.clone(),
        };

        let mut dependency = Dependency::NotStarted;
        for descriptor in &STAGES {
            let kind = descriptor.kind;
            if !flags.is_enabled(kind) {
                tracing::debug!(stage = %kind, "stage disabled, dropping its block");
                report.active_config.remove_section(descriptor.config_key);
                continue;
            }

            let stage = self.stage_for(kind, dataset, model);
            let record = invocation.invoke(kind, stage, dependency)?;
            dependency = record.produced.clone();
            report.stages.push(record);

            if kind == StageKind::Export {
                for follow_up in &self.export_follow_ups {
                    if !follow_up.is_enabled(config) {
                        tracing::debug!(stage = follow_up.id(), "follow-up switched off");
                        continue;
                    }
                    let record = invocation.invoke(kind, follow_up.as_ref(), dependency.clone())?;
                    report.stages.push(record);
                }
            }
        }

        tracing::info!(%run_id, stages = report.stages.len(), last = %dependency, "pipeline submitted");
        report.dependency = dependency;
        Ok(report)
    }

    fn stage_for(&self, kind: StageKind, dataset: DatasetFamily, model: ModelFamily) -> &dyn Stage {
        match kind {
            StageKind::DataPreparation => self.catalog.data_preparation(dataset),
            StageKind::Training => self.catalog.training(),
            StageKind::Conversion => self.catalog.conversion(),
            StageKind::Finetuning => self.catalog.finetuning(),
            StageKind::PromptLearning => self.catalog.prompt_learning(),
            StageKind::Evaluation => self.catalog.evaluation(model),
            StageKind::Export => self.catalog.export(),
        }
    }
}

impl Invocation<'_> {
    fn invoke(
        &self,
        kind: StageKind,
        stage: &dyn Stage,
        after: Dependency,
    ) -> Result<StageRecord, LauncherError> {
        let start = Instant::now();
        let cli_args = stage.uses_cli_args().then_some(self.cli_args);
        let ctx = StageContext::new(self.run_id, self.config, cli_args, self.submitter);

        let produced = stage
            .run(&ctx, after.clone())
            .map_err(|source| LauncherError::Stage { stage: kind, source })?;

        Ok(StageRecord {
            stage: kind,
            id: stage.id().to_string(),
            after,
            produced,
            jobs: ctx.take_jobs(),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
