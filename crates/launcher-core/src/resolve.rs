//! Descriptor resolution: pick one implementation family from a config string.
//!
//! Markers are tested in table order and the first one contained in the
//! descriptor wins. Order is significant: `prompt_gpt3` contains `gpt3`, so
//! it has to be checked first.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LauncherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFamily {
    Pile,
    Mc4,
    Custom,
}

impl DatasetFamily {
    pub const MARKERS: [(&'static str, DatasetFamily); 3] = [
        ("pile", DatasetFamily::Pile),
        ("mc4", DatasetFamily::Mc4),
        ("custom", DatasetFamily::Custom),
    ];

    pub fn resolve(descriptor: &str) -> Result<Self, LauncherError> {
        first_match(&Self::MARKERS, descriptor)
            .ok_or_else(|| LauncherError::UnrecognizedDataset(descriptor.to_string()))
    }

    pub fn marker(self) -> &'static str {
        marker_of(&Self::MARKERS, self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    PromptGpt3,
    Gpt3,
    T5,
}

impl ModelFamily {
    pub const MARKERS: [(&'static str, ModelFamily); 3] = [
        ("prompt_gpt3", ModelFamily::PromptGpt3),
        ("gpt3", ModelFamily::Gpt3),
        ("t5", ModelFamily::T5),
    ];

    pub fn resolve(descriptor: &str) -> Result<Self, LauncherError> {
        first_match(&Self::MARKERS, descriptor)
            .ok_or_else(|| LauncherError::UnrecognizedModel(descriptor.to_string()))
    }

    pub fn marker(self) -> &'static str {
        marker_of(&Self::MARKERS, self)
    }
}

impl fmt::Display for DatasetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

fn first_match<T: Copy>(markers: &[(&str, T)], descriptor: &str) -> Option<T> {
    markers
        .iter()
        .find(|(marker, _)| descriptor.contains(marker))
        .map(|(_, family)| *family)
}

fn marker_of<T: Copy + PartialEq>(markers: &[(&'static str, T)], family: T) -> &'static str {
    markers
        .iter()
        .find(|(_, candidate)| *candidate == family)
        .map(|(marker, _)| *marker)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_markers() {
        assert_eq!(DatasetFamily::resolve("download_gpt3_pile").unwrap(), DatasetFamily::Pile);
        assert_eq!(DatasetFamily::resolve("download_mc4").unwrap(), DatasetFamily::Mc4);
        assert_eq!(DatasetFamily::resolve("custom_dataset").unwrap(), DatasetFamily::Custom);
    }

    #[test]
    fn test_unknown_dataset_names_input() {
        let err = DatasetFamily::resolve("unknown-dataset").unwrap_err();
        assert!(matches!(&err, LauncherError::UnrecognizedDataset(d) if d == "unknown-dataset"));
        assert!(err.to_string().contains("`unknown-dataset`"));
    }

    #[test]
    fn test_dataset_first_match_wins() {
        assert_eq!(DatasetFamily::resolve("pile_and_mc4").unwrap(), DatasetFamily::Pile);
        assert_eq!(DatasetFamily::resolve("custom_mc4").unwrap(), DatasetFamily::Mc4);
    }

    #[test]
    fn test_model_markers() {
        assert_eq!(ModelFamily::resolve("gpt3/evaluate_all").unwrap(), ModelFamily::Gpt3);
        assert_eq!(
            ModelFamily::resolve("prompt_gpt3/squad").unwrap(),
            ModelFamily::PromptGpt3
        );
        assert_eq!(ModelFamily::resolve("t5/squad").unwrap(), ModelFamily::T5);
    }

    #[test]
    fn test_unknown_model() {
        let err = ModelFamily::resolve("bert/glue").unwrap_err();
        assert!(matches!(err, LauncherError::UnrecognizedModel(d) if d == "bert/glue"));
    }

    #[test]
    fn test_model_resolution_is_idempotent() {
        let first = ModelFamily::resolve("prompt_gpt3/squad").unwrap();
        let second = ModelFamily::resolve("prompt_gpt3/squad").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_marker_roundtrip() {
        for (marker, family) in ModelFamily::MARKERS {
            assert_eq!(family.marker(), marker);
        }
        assert_eq!(DatasetFamily::Mc4.to_string(), "mc4");
    }
}
