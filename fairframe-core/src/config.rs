//! Configuration for the fairframe engine.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.

use crate::error::{MetricFrameError, StateError};
use crate::frame::AggregationMethod;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Subgroup count above which a performance warning is logged.
    #[serde(default = "default_subgroup_warning_threshold")]
    pub subgroup_warning_threshold: usize,
    /// Method used by `difference_default` and `ratio_default`.
    #[serde(default = "default_method")]
    pub default_method: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            subgroup_warning_threshold: default_subgroup_warning_threshold(),
            default_method: default_method(),
        }
    }
}

fn default_subgroup_warning_threshold() -> usize {
    20
}

fn default_method() -> String {
    "between_groups".to_string()
}

impl FrameConfig {
    /// The configured default aggregation method.
    pub fn default_aggregation(&self) -> Result<AggregationMethod, StateError> {
        self.default_method.parse()
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `FAIRFRAME_`)
/// 3. The TOML file at `path`, if it exists
/// 4. Built-in defaults
pub fn load_config(
    path: Option<&Path>,
    overrides: Option<&FrameConfig>,
) -> Result<FrameConfig, MetricFrameError> {
    let mut figment = Figment::from(Serialized::defaults(FrameConfig::default()));

    if let Some(path) = path {
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
    }

    // FAIRFRAME_SUBGROUP_WARNING_THRESHOLD, FAIRFRAME_DEFAULT_METHOD
    figment = figment.merge(Env::prefixed("FAIRFRAME_"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config = figment.extract().map_err(Box::new)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FrameConfig::default();
        assert_eq!(config.subgroup_warning_threshold, 20);
        assert_eq!(
            config.default_aggregation().unwrap(),
            AggregationMethod::BetweenGroups
        );
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = FrameConfig {
            subgroup_warning_threshold: 100,
            default_method: "to_overall".to_string(),
        };
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.subgroup_warning_threshold, 100);
        assert_eq!(
            config.default_aggregation().unwrap(),
            AggregationMethod::ToOverall
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fairframe.toml");
        std::fs::write(&path, "subgroup_warning_threshold = 64\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.subgroup_warning_threshold, 64);
        assert_eq!(config.default_method, "between_groups");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/fairframe.toml")), None).unwrap();
        assert_eq!(config.subgroup_warning_threshold, 20);
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fairframe.toml");
        std::fs::write(&path, "subgroup_warning_threshold = \"lots\"\n").unwrap();

        let err = load_config(Some(&path), None).unwrap_err();
        assert!(matches!(err, MetricFrameError::Config(_)));
        assert!(err.to_string().starts_with("Failed to load configuration"));
    }

    #[test]
    fn test_invalid_default_method() {
        let config = FrameConfig {
            default_method: "sideways".to_string(),
            ..FrameConfig::default()
        };
        assert!(matches!(
            config.default_aggregation(),
            Err(StateError::InvalidAggregationMethod { .. })
        ));
    }
}
