//! CLI Args: flatten a configuration into `dotted.key=value` arguments.
//!
//! The launched entry scripts rebuild the same tree from these strings, so
//! the walk is depth-first and keeps mapping order.

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::config::{render_inline, Config};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CliArgs(Vec<String>);

impl CliArgs {
    pub fn from_config(config: &Config) -> Self {
        let mut args = Vec::new();
        flatten(config.as_mapping(), "", &mut args);
        Self(args)
    }

    /// Flatten one block, with keys relative to that block.
    pub fn from_value(value: &Value) -> Self {
        let mut args = Vec::new();
        if let Value::Mapping(mapping) = value {
            flatten(mapping, "", &mut args);
        }
        Self(args)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_command_line(&self) -> String {
        self.0.join(" ")
    }
}

fn flatten(mapping: &Mapping, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in mapping {
        let key = render_inline(key);
        if prefix.is_empty() && key == "defaults" {
            continue;
        }
        let dotted = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::Mapping(inner) => flatten(inner, &dotted, out),
            // escaped interpolation left over after resolution
            Value::String(s) if s.contains("${") => {}
            other => out.push(format!("{}={}", dotted, render_inline(other).replace('=', "\\="))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_nested_in_order() {
        let config = Config::from_yaml(
            "run_training: true\n\
             training:\n  run:\n    name: gpt3\n  trainer:\n    devices: 8\n    precision: bf16\n\
             data_config: download_pile\n",
        )
        .unwrap();

        let args = CliArgs::from_config(&config);
        assert_eq!(
            args.as_slice(),
            &[
                "run_training=true",
                "training.run.name=gpt3",
                "training.trainer.devices=8",
                "training.trainer.precision=bf16",
                "data_config=download_pile",
            ]
        );
    }

    #[test]
    fn test_flatten_special_values() {
        let config = Config::from_yaml(
            "defaults:\n  - training: x\n\
             splits: [99, 1, 0]\n\
             tokenizer: null\n\
             results: ${base_results_dir}/run\n\
             checkpoint_name: megatron--val_loss=2.1-step=100\n",
        )
        .unwrap();

        let args = CliArgs::from_config(&config);
        assert_eq!(
            args.as_slice(),
            &[
                "splits=[99,1,0]",
                "tokenizer=null",
                "checkpoint_name=megatron--val_loss\\=2.1-step\\=100",
            ]
        );
    }

    #[test]
    fn test_command_line_join() {
        let config = Config::from_yaml("a: 1\nb: two\n").unwrap();
        assert_eq!(CliArgs::from_config(&config).to_command_line(), "a=1 b=two");
    }

    #[test]
    fn test_from_value_relative_keys() {
        let config = Config::from_yaml("evaluation:\n  model:\n    tp: 2\n").unwrap();
        let args = CliArgs::from_value(config.get("evaluation").unwrap());
        assert_eq!(args.as_slice(), &["model.tp=2"]);
    }
}
