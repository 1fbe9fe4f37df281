//! Normalized partitioning features with per-class masks.

use crate::data::{Level, check_consistent_length};
use crate::error::{ConfigurationError, Result};
use crate::features::input::FeatureInput;
use serde_json::Value;
use std::collections::HashSet;

/// Base name for generated sensitive feature names.
pub const SENSITIVE_BASE_NAME: &str = "sensitive_feature_";
/// Base name for generated control feature names.
pub const CONTROL_BASE_NAME: &str = "control_feature_";

/// One partitioning dimension of the dataset.
#[derive(Debug, Clone)]
pub struct Feature {
    name: String,
    classes: Vec<Level>,
    masks: Vec<Vec<bool>>,
    len: usize,
}

impl Feature {
    /// Build a feature from raw cells. Classes are the sorted distinct values.
    pub fn from_column(name: impl Into<String>, cells: &[Value]) -> Result<Self, ConfigurationError> {
        let values: Vec<Level> = cells
            .iter()
            .map(Level::from_json)
            .collect::<Option<_>>()
            .ok_or(ConfigurationError::NonScalarFeatureList)?;

        let mut classes = values.clone();
        classes.sort();
        classes.dedup();

        let masks = classes
            .iter()
            .map(|class| values.iter().map(|v| v == class).collect())
            .collect();

        Ok(Self {
            name: name.into(),
            classes,
            masks,
            len: values.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinct values in sorted order.
    pub fn classes(&self) -> &[Level] {
        &self.classes
    }

    /// Number of samples the feature covers.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The selection mask for one class, or `None` if the class never occurs.
    pub fn mask_for_class(&self, class: &Level) -> Option<&[bool]> {
        self.classes
            .binary_search(class)
            .ok()
            .map(|i| self.masks[i].as_slice())
    }
}

/// Normalize a raw feature input into features, checking every column
/// against the dataset length.
pub fn build_features(base_name: &str, input: &FeatureInput, expected_len: usize) -> Result<Vec<Feature>> {
    let columns = input.columns(base_name)?;
    let mut features = Vec::with_capacity(columns.len());
    for (name, cells) in columns {
        check_consistent_length(&[("y_true", expected_len), (name.as_str(), cells.len())])?;
        features.push(Feature::from_column(name, &cells)?);
    }
    Ok(features)
}

/// Reject duplicate names across the sensitive and control features.
pub fn check_unique_names(sensitive: &[Feature], control: Option<&[Feature]>) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for feature in sensitive.iter().chain(control.unwrap_or_default()) {
        if !seen.insert(feature.name()) {
            return Err(ConfigurationError::DuplicateFeatureName {
                name: feature.name().to_string(),
            });
        }
    }
    Ok(())
}
