//! Feature normalization: raw partitioning inputs to uniform features.

pub mod feature;
pub mod input;

pub use feature::{
    CONTROL_BASE_NAME, Feature, SENSITIVE_BASE_NAME, build_features, check_unique_names,
};
pub use input::FeatureInput;
