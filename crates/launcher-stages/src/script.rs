//! Batch Script: rendering and submission shared by every stage.
//!
//! A stage job is a Handlebars-rendered sbatch script that runs one Python
//! entry point with `dotted.key=value` arguments. Every word that reaches the
//! shell is quoted, so the entry point sees each argument byte for byte. The
//! script is written to the run's results directory and then handed to the
//! context's submitter.

use handlebars::Handlebars;
use launcher_core::{Dependency, JobSpec, StageContext, StageError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SBATCH_TEMPLATE: &str = r#"#!/bin/bash
# launcher run {{run_id}}
#SBATCH --job-name={{job_name}}
#SBATCH --nodes={{nodes}}
#SBATCH --ntasks-per-node={{ntasks_per_node}}
#SBATCH --time={{time_limit}}
#SBATCH --output={{results_dir}}/{{job_name}}-%j.log
{{#if partition}}#SBATCH --partition={{partition}}
{{/if}}{{#if account}}#SBATCH --account={{account}}
{{/if}}{{#if gpus_per_task}}#SBATCH --gpus-per-task={{gpus_per_task}}
{{/if}}{{#if gres}}#SBATCH --gres={{gres}}
{{/if}}{{#if exclusive}}#SBATCH --exclusive
{{/if}}
set -euo pipefail
{{#each env}}export {{@key}}={{this}}
{{/each}}
srun{{#if container}} --container-image={{container}}{{/if}} {{command}}
"#;

static SCRIPTS: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("sbatch", SBATCH_TEMPLATE)
        .unwrap();
    handlebars
});

/// `cluster:` block of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub partition: Option<String>,
    pub account: Option<String>,
    pub job_name_prefix: String,
    pub gpus_per_task: Option<u32>,
    pub gres: Option<String>,
    pub exclusive: bool,
}

/// `<stage>.run:` block of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    pub name: String,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default = "default_time_limit")]
    pub time_limit: String,
    #[serde(default = "one")]
    pub nodes: u32,
    #[serde(default = "one")]
    pub ntasks_per_node: u32,
}

fn default_time_limit() -> String {
    "04:00:00".to_string()
}

fn one() -> u32 {
    1
}

#[derive(Serialize)]
struct ScriptData<'a> {
    run_id: &'a str,
    job_name: &'a str,
    nodes: u32,
    ntasks_per_node: u32,
    time_limit: &'a str,
    results_dir: String,
    partition: Option<&'a str>,
    account: Option<&'a str>,
    gpus_per_task: Option<u32>,
    gres: Option<&'a str>,
    exclusive: bool,
    env: BTreeMap<String, String>,
    container: Option<String>,
    command: String,
}

/// One Python entry point to run as a batch job.
#[derive(Debug, Clone)]
pub struct ScriptJob<'a> {
    /// Top-level config block holding `run:` settings.
    pub block: &'a str,
    /// Step suffix, unique within the stage.
    pub step: &'a str,
    /// Entry script, relative to `launcher_scripts_path`.
    pub entry: &'a str,
    pub args: Vec<String>,
}

impl ScriptJob<'_> {
    /// Render, write and submit behind `after`.
    pub fn submit(&self, ctx: &StageContext<'_>, after: Dependency) -> Result<Dependency, StageError> {
        let job = self.prepare(ctx)?;
        ctx.submit(job, after)
    }

    /// Render and write the script without submitting it.
    pub fn prepare(&self, ctx: &StageContext<'_>) -> Result<JobSpec, StageError> {
        let run = run_settings(ctx, self.block)?;
        let cluster: ClusterSettings = ctx
            .config
            .section("cluster")
            .map_err(|e| StageError::InvalidConfig(e.to_string()))?
            .unwrap_or_default();

        let results_dir = match &run.results_dir {
            Some(dir) => dir.clone(),
            None => base_results_dir(ctx).join(&run.name),
        };
        std::fs::create_dir_all(&results_dir).map_err(|source| io_error(&results_dir, source))?;

        let job_name = format!("{}{}_{}", cluster.job_name_prefix, run.name, self.step);
        let command = self.command(ctx)?;
        let container = ctx
            .config
            .get("container")
            .and_then(Value::as_str)
            .map(quote)
            .transpose()?;

        let data = ScriptData {
            run_id: ctx.run_id,
            job_name: &job_name,
            nodes: run.nodes,
            ntasks_per_node: run.ntasks_per_node,
            time_limit: &run.time_limit,
            results_dir: results_dir.display().to_string(),
            partition: cluster.partition.as_deref(),
            account: cluster.account.as_deref(),
            gpus_per_task: cluster.gpus_per_task,
            gres: cluster.gres.as_deref(),
            exclusive: cluster.exclusive,
            env: env_vars(ctx)?,
            container,
            command,
        };
        let body = SCRIPTS
            .render("sbatch", &data)
            .map_err(|e| StageError::Render(e.to_string()))?;

        let script = results_dir.join(format!("{}_{}.sh", run.name, self.step));
        std::fs::write(&script, &body).map_err(|source| io_error(&script, source))?;
        tracing::debug!(job = %job_name, script = %script.display(), "wrote batch script");

        Ok(JobSpec {
            name: job_name,
            script,
            body,
        })
    }

    /// Shell-quoted `python3 -u <entry> <args...>` line.
    fn command(&self, ctx: &StageContext<'_>) -> Result<String, StageError> {
        let scripts_path = ctx
            .config
            .get("launcher_scripts_path")
            .and_then(Value::as_str)
            .unwrap_or(".");
        let entry = format!("{}/{}", scripts_path.trim_end_matches('/'), self.entry);

        let words = ["python3", "-u", entry.as_str()]
            .into_iter()
            .chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).map_err(|e| StageError::Render(format!("cannot quote command: {e}")))
    }
}

/// Flattened args of the whole config, for stages that take them.
pub fn shared_args(ctx: &StageContext<'_>) -> Result<Vec<String>, StageError> {
    ctx.cli_args
        .map(|args| args.as_slice().to_vec())
        .ok_or_else(|| StageError::InvalidConfig("stage expects flattened CLI args".to_string()))
}

/// Flattened args of a single block, keys relative to it.
pub fn block_args(ctx: &StageContext<'_>, block: &str) -> Vec<String> {
    ctx.config
        .get(block)
        .map(|value| launcher_core::CliArgs::from_value(value).as_slice().to_vec())
        .unwrap_or_default()
}

/// Boolean switch inside a stage block; absent means off.
pub fn block_flag(ctx: &StageContext<'_>, block: &str, key: &str) -> bool {
    ctx.config
        .get_path(&format!("{block}.{key}"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn run_settings(ctx: &StageContext<'_>, block: &str) -> Result<RunSettings, StageError> {
    let value = ctx
        .config
        .get_path(&format!("{block}.run"))
        .ok_or_else(|| StageError::InvalidConfig(format!("`{block}.run` is missing")))?;
    serde_yaml::from_value(value.clone())
        .map_err(|e| StageError::InvalidConfig(format!("invalid `{block}.run`: {e}")))
}

fn base_results_dir(ctx: &StageContext<'_>) -> PathBuf {
    ctx.config
        .get("base_results_dir")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("results"))
}

/// `env_vars:` entries with shell-quoted values; null and nested values are skipped.
fn env_vars(ctx: &StageContext<'_>) -> Result<BTreeMap<String, String>, StageError> {
    let Some(Value::Mapping(vars)) = ctx.config.get("env_vars") else {
        return Ok(BTreeMap::new());
    };
    let mut env = BTreeMap::new();
    for (key, value) in vars {
        let Some(key) = key.as_str() else { continue };
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        env.insert(key.to_string(), quote(&value)?);
    }
    Ok(env)
}

fn quote(word: &str) -> Result<String, StageError> {
    shlex::try_quote(word)
        .map(Cow::into_owned)
        .map_err(|e| StageError::Render(format!("cannot quote `{word}`: {e}")))
}

fn io_error(path: &Path, source: std::io::Error) -> StageError {
    StageError::Io {
        path: path.display().to_string(),
        source,
    }
}
