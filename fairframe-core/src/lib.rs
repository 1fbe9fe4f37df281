//! # fairframe-core: Disaggregated Metric Evaluation
//!
//! Evaluates metric functions over a dataset and over every subgroup induced
//! by one or more sensitive features, then summarizes the disparity between
//! subgroups.
//!
//! ```no_run
//! use fairframe_core::{AggregationMethod, FeatureInput, MetricFrame, MetricSpec, metrics};
//!
//! let mut mf = MetricFrame::new(
//!     MetricSpec::single(metrics::accuracy_score),
//!     vec![0, 1, 0, 1],
//!     vec![0, 1, 1, 1],
//!     FeatureInput::flat(["a", "a", "b", "b"]),
//! )?;
//! let gap = mf.difference(AggregationMethod::BetweenGroups)?;
//! assert_eq!(gap.as_scalar(), Some(0.5));
//! # Ok::<(), fairframe_core::MetricFrameError>(())
//! ```

// Foundation
pub mod config;
pub mod error;

// Inputs
pub mod data;
pub mod features;
pub mod functions;

// Evaluation
pub mod frame;
pub mod grouping;
pub mod metrics;
pub mod result;

// Re-exports
pub use config::{FrameConfig, load_config};
pub use data::{Column, Level};
pub use error::{MetricFrameError, Result};
pub use features::FeatureInput;
pub use frame::{AggregationMethod, Batch, FrameState, MetricFrame, MetricFrameBuilder};
pub use functions::{MetricFn, MetricSpec, SampleParams, SampleParamsInput};
pub use result::{Axis, MetricResult, MetricValue, Series, Table};
