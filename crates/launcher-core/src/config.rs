//! Configuration tree: ordered YAML with hydra-style composition and overrides.
//!
//! The launcher keeps the whole document as a `serde_yaml::Mapping` so key
//! order survives pruning and re-serialization.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::error::LauncherError;

/// Key holding the list of config groups to compose.
const DEFAULTS_KEY: &str = "defaults";
/// Defaults entry standing for the primary file itself.
const SELF_ENTRY: &str = "_self_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    root: Mapping,
}

impl Config {
    /// Parse a single YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, LauncherError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, LauncherError> {
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            _ => Err(LauncherError::Config(
                "top level of a config file must be a mapping".to_string(),
            )),
        }
    }

    /// Load a single YAML file without composition.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LauncherError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LauncherError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load `<dir>/<name>.yaml` and compose every group named in its
    /// `defaults` list from `<dir>/<group>/<option>.yaml`.
    ///
    /// Values written in the primary file win over the group files. Groups
    /// not mentioned in the primary file are appended in `defaults` order.
    pub fn compose(dir: impl AsRef<Path>, name: &str) -> Result<Self, LauncherError> {
        Self::compose_groups(dir.as_ref(), name, Vec::new())
    }

    /// Compose like [`Config::compose`], then apply `overrides` in order.
    ///
    /// An undotted override whose key is a group directory under `dir`
    /// (`training=gpt3_5b`) picks `<dir>/training/gpt3_5b.yaml` instead of
    /// setting a value; `null` drops the group. Group picks are made before
    /// any value override, whatever their position.
    pub fn compose_with<S: AsRef<str>>(
        dir: impl AsRef<Path>,
        name: &str,
        overrides: &[S],
    ) -> Result<Self, LauncherError> {
        let dir = dir.as_ref();
        let mut selections: Vec<(String, Value)> = Vec::new();
        let mut values = Vec::new();
        for spec in overrides {
            let spec = spec.as_ref();
            match group_selection(dir, spec) {
                Some((group, option)) => {
                    selections.retain(|(picked, _)| *picked != group);
                    selections.push((group, option));
                }
                None => values.push(spec),
            }
        }

        let mut config = Self::compose_groups(dir, name, selections)?;
        for spec in values {
            config.apply_override(spec)?;
        }
        Ok(config)
    }

    fn compose_groups(
        dir: &Path,
        name: &str,
        mut selections: Vec<(String, Value)>,
    ) -> Result<Self, LauncherError> {
        let mut primary = Self::load(dir.join(format!("{name}.yaml")))?;

        let entries = match primary.root.shift_remove(DEFAULTS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries,
            Some(_) => {
                return Err(LauncherError::Config(
                    "`defaults` must be a list".to_string(),
                ))
            }
        };

        let mut groups: Vec<(String, Value)> = Vec::new();
        for entry in entries {
            let mapping = match entry {
                Value::String(s) if s == SELF_ENTRY => continue,
                Value::Mapping(mapping) => mapping,
                other => {
                    return Err(LauncherError::Config(format!(
                        "unsupported defaults entry `{}`",
                        render_inline(&other)
                    )))
                }
            };
            for (group, option) in mapping {
                let group = group.as_str().ok_or_else(|| {
                    LauncherError::Config("defaults group names must be strings".to_string())
                })?;
                let option = match selections.iter().position(|(picked, _)| picked == group) {
                    Some(index) => selections.remove(index).1,
                    None => option,
                };
                groups.push((group.to_string(), option));
            }
        }
        // groups picked on the command line but absent from `defaults`
        groups.extend(selections);

        for (group, option) in groups {
            let option = match option {
                Value::Null => continue,
                Value::String(option) => option,
                other => {
                    return Err(LauncherError::Config(format!(
                        "defaults option for `{}` must be a string, got `{}`",
                        group,
                        render_inline(&other)
                    )))
                }
            };
            primary.merge_group(dir, &group, &option)?;
        }

        Ok(primary)
    }

    /// Lay `<dir>/<group>/<option>.yaml` under whatever the primary file
    /// already holds for `group`.
    fn merge_group(&mut self, dir: &Path, group: &str, option: &str) -> Result<(), LauncherError> {
        let block = Self::load(dir.join(group).join(format!("{option}.yaml")))?;
        let key = Value::String(group.to_string());
        let merged = match self.root.get(&key) {
            Some(own) => deep_merge(Value::Mapping(block.root), own.clone()),
            None => Value::Mapping(block.root),
        };
        tracing::debug!(group, option, "composed config group");
        self.root.insert(key, merged);
        Ok(())
    }

    /// Apply a `dotted.key=value` override. A leading `+` is accepted.
    pub fn apply_override(&mut self, spec: &str) -> Result<(), LauncherError> {
        let spec = spec.strip_prefix('+').unwrap_or(spec);
        let (path, raw) = spec.split_once('=').ok_or_else(|| {
            LauncherError::Config(format!("override `{spec}` is not of the form key=value"))
        })?;
        if path.is_empty() {
            return Err(LauncherError::Config(format!("override `{spec}` has an empty key")));
        }

        let value = if raw.is_empty() {
            Value::String(String::new())
        } else {
            serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        self.set_path(path, value)
    }

    /// Set a value at a dotted path, creating intermediate mappings.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), LauncherError> {
        let mut keys: Vec<&str> = path.split('.').collect();
        let last = keys.pop().unwrap_or(path);

        let mut node = &mut self.root;
        for key in keys {
            let entry = node
                .entry(Value::String(key.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if entry.is_null() {
                *entry = Value::Mapping(Mapping::new());
            }
            node = entry.as_mapping_mut().ok_or_else(|| {
                LauncherError::Config(format!("cannot set `{path}`: `{key}` is not a mapping"))
            })?;
        }

        node.insert(Value::String(last.to_string()), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Look up a dotted path such as `training.run.name`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Boolean switch; absent or non-boolean means `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// String descriptor used to pick an implementation.
    pub fn descriptor(&self, key: &str) -> Result<&str, LauncherError> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| LauncherError::MissingField(key.to_string()))
    }

    /// Deserialize a top-level block into a typed section.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LauncherError> {
        self.get(key)
            .map(|value| serde_yaml::from_value(value.clone()))
            .transpose()
            .map_err(|e| LauncherError::Config(format!("invalid `{key}` block: {e}")))
    }

    /// Remove a top-level block, keeping the order of the others.
    pub fn remove_section(&mut self, key: &str) -> Option<Value> {
        self.root.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.root.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().filter_map(Value::as_str)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    /// Copy of this config with every `${...}` interpolation resolved.
    pub fn resolved(&self) -> Result<Self, LauncherError> {
        Ok(Self {
            root: crate::interpolate::resolve_tree(&self.root)?,
        })
    }

    pub fn to_yaml(&self) -> Result<String, LauncherError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }
}

/// `group=option` override naming a config group directory.
fn group_selection(dir: &Path, spec: &str) -> Option<(String, Value)> {
    let spec = spec.strip_prefix('+').unwrap_or(spec);
    let (group, option) = spec.split_once('=')?;
    if group.is_empty() || group.contains('.') || !dir.join(group).is_dir() {
        return None;
    }
    let option = match option {
        "null" | "~" => Value::Null,
        option => Value::String(option.to_string()),
    };
    Some((group.to_string(), option))
}

/// Recursively lay `over` on top of `base`; non-mapping values replace.
fn deep_merge(base: Value, over: Value) -> Value {
    match (base, over) {
        (Value::Mapping(mut base), Value::Mapping(over)) => {
            for (key, value) in over {
                let merged = match base.shift_remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Mapping(base)
        }
        (_, over) => over,
    }
}

/// Compact single-line rendering used in messages and CLI args.
pub(crate) fn render_inline(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(render_inline).collect();
            format!("[{}]", items.join(","))
        }
        Value::Mapping(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", render_inline(k), render_inline(v)))
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
        Value::Tagged(tagged) => render_inline(&tagged.value),
    }
}
