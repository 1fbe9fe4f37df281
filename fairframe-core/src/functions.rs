//! Metric function containers and their per-sample parameters.

use crate::data::{Column, check_consistent_length};
use crate::error::{ConfigurationError, MetricFrameError, Result, StateError};
use crate::result::MetricValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Calling convention for metric functions: `(y_true, y_pred, params)`.
pub type MetricFn =
    Arc<dyn Fn(&Column, &Column, &SampleParams) -> anyhow::Result<MetricValue> + Send + Sync>;

/// Name given to the function when a single callable is supplied.
pub const SINGLE_METRIC_NAME: &str = "metric";

/// Named per-sample arrays passed alongside `y_true` and `y_pred`,
/// e.g. `sample_weight`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleParams {
    params: BTreeMap<String, Column>,
}

impl SampleParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, column: impl Into<Column>) -> Self {
        self.insert(name, column);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, column: impl Into<Column>) {
        self.params.insert(name.into(), column.into());
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.params.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Slice every parameter with the same mask.
    pub fn select(&self, mask: &[bool]) -> SampleParams {
        SampleParams {
            params: self
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.select(mask)))
                .collect(),
        }
    }

    pub(crate) fn check_length(&self, expected: usize) -> Result<()> {
        for (name, column) in &self.params {
            check_consistent_length(&[("y_true", expected), (name.as_str(), column.len())])?;
        }
        Ok(())
    }

    fn concat(batches: &[&SampleParams]) -> Result<SampleParams, StateError> {
        let mut params = BTreeMap::new();
        if let Some(first) = batches.first() {
            for key in first.params.keys() {
                let columns: Vec<Column> = batches
                    .iter()
                    .filter_map(|b| b.params.get(key).cloned())
                    .collect();
                params.insert(key.clone(), Column::concat("sample_params", &columns)?);
            }
        }
        Ok(SampleParams { params })
    }
}

/// Sample params as supplied by the caller.
///
/// A single callable takes one flat mapping. A named collection takes a
/// mapping from metric name to that metric's params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleParamsInput {
    Flat(SampleParams),
    PerMetric(BTreeMap<String, SampleParams>),
}

impl SampleParamsInput {
    pub fn per_metric<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, SampleParams)>,
        K: Into<String>,
    {
        SampleParamsInput::PerMetric(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SampleParamsInput::Flat(p) => p.is_empty(),
            SampleParamsInput::PerMetric(m) => m.values().all(SampleParams::is_empty),
        }
    }

    /// Every parameter column, with a display name.
    pub(crate) fn lengths(&self) -> Vec<(String, usize)> {
        match self {
            SampleParamsInput::Flat(p) => p.iter().map(|(k, c)| (k.to_string(), c.len())).collect(),
            SampleParamsInput::PerMetric(m) => m
                .iter()
                .flat_map(|(metric, p)| p.iter().map(move |(k, c)| (format!("{metric}.{k}"), c.len())))
                .collect(),
        }
    }

    /// Shape and key sets, used to check batches agree with each other.
    pub(crate) fn signature(&self) -> String {
        match self {
            SampleParamsInput::Flat(p) => format!("{:?}", p.keys().collect::<Vec<_>>()),
            SampleParamsInput::PerMetric(m) => format!(
                "{:?}",
                m.iter()
                    .map(|(metric, p)| (metric.as_str(), p.keys().collect::<Vec<_>>()))
                    .collect::<Vec<_>>()
            ),
        }
    }

    pub(crate) fn concat(batches: &[SampleParamsInput]) -> Result<Option<SampleParamsInput>, StateError> {
        let Some(first) = batches.first() else {
            return Ok(None);
        };
        let merged = match first {
            SampleParamsInput::Flat(_) => {
                let flats: Vec<&SampleParams> = batches
                    .iter()
                    .filter_map(|b| match b {
                        SampleParamsInput::Flat(p) => Some(p),
                        SampleParamsInput::PerMetric(_) => None,
                    })
                    .collect();
                SampleParamsInput::Flat(SampleParams::concat(&flats)?)
            }
            SampleParamsInput::PerMetric(first_map) => {
                let mut merged = BTreeMap::new();
                for metric in first_map.keys() {
                    let per_batch: Vec<&SampleParams> = batches
                        .iter()
                        .filter_map(|b| match b {
                            SampleParamsInput::PerMetric(m) => m.get(metric),
                            SampleParamsInput::Flat(_) => None,
                        })
                        .collect();
                    merged.insert(metric.clone(), SampleParams::concat(&per_batch)?);
                }
                SampleParamsInput::PerMetric(merged)
            }
        };
        Ok(Some(merged))
    }
}

impl From<SampleParams> for SampleParamsInput {
    fn from(p: SampleParams) -> Self {
        SampleParamsInput::Flat(p)
    }
}

/// The metric function(s) a frame evaluates.
///
/// Results of a [`MetricSpec::Single`] frame drop the function-name axis;
/// a [`MetricSpec::Named`] collection keeps it even with one entry.
#[derive(Clone)]
pub enum MetricSpec {
    Single { name: String, func: MetricFn },
    Named(Vec<(String, MetricFn)>),
}

impl MetricSpec {
    pub fn single<F>(func: F) -> Self
    where
        F: Fn(&Column, &Column, &SampleParams) -> anyhow::Result<MetricValue> + Send + Sync + 'static,
    {
        Self::single_named(SINGLE_METRIC_NAME, func)
    }

    pub fn single_named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Column, &Column, &SampleParams) -> anyhow::Result<MetricValue> + Send + Sync + 'static,
    {
        MetricSpec::Single {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// An empty named collection; add entries with [`MetricSpec::with`].
    pub fn named() -> Self {
        MetricSpec::Named(Vec::new())
    }

    /// Add a named function. A single callable becomes a collection that
    /// keeps it under its current name.
    pub fn with<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Column, &Column, &SampleParams) -> anyhow::Result<MetricValue> + Send + Sync + 'static,
    {
        let entry: (String, MetricFn) = (name.into(), Arc::new(func));
        let mut entries = match self {
            MetricSpec::Named(entries) => entries,
            MetricSpec::Single { name, func } => vec![(name, func)],
        };
        entries.push(entry);
        MetricSpec::Named(entries)
    }

    pub fn is_single(&self) -> bool {
        matches!(self, MetricSpec::Single { .. })
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            MetricSpec::Single { name, .. } => vec![name.as_str()],
            MetricSpec::Named(entries) => entries.iter().map(|(n, _)| n.as_str()).collect(),
        }
    }
}

impl fmt::Debug for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSpec::Single { name, .. } => f.debug_struct("Single").field("name", name).finish(),
            MetricSpec::Named(_) => f.debug_tuple("Named").field(&self.names()).finish(),
        }
    }
}

/// One metric function bound to its sample params.
#[derive(Clone)]
pub struct FunctionContainer {
    name: String,
    func: MetricFn,
    sample_params: SampleParams,
}

impl FunctionContainer {
    pub fn new(name: impl Into<String>, func: MetricFn, sample_params: SampleParams) -> Self {
        Self {
            name: name.into(),
            func,
            sample_params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_params(&self) -> &SampleParams {
        &self.sample_params
    }

    /// Evaluate over the whole dataset.
    pub fn evaluate_all(&self, y_true: &Column, y_pred: &Column) -> Result<MetricValue> {
        (self.func)(y_true, y_pred, &self.sample_params).map_err(|source| MetricFrameError::Metric {
            name: self.name.clone(),
            source,
        })
    }

    /// Evaluate over the samples selected by `mask`. The same mask slices
    /// `y_true`, `y_pred` and every sample param.
    pub fn evaluate(&self, y_true: &Column, y_pred: &Column, mask: &[bool]) -> Result<MetricValue> {
        let params = self.sample_params.select(mask);
        (self.func)(&y_true.select(mask), &y_pred.select(mask), &params).map_err(|source| {
            MetricFrameError::Metric {
                name: self.name.clone(),
                source,
            }
        })
    }
}

impl fmt::Debug for FunctionContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionContainer")
            .field("name", &self.name)
            .field("sample_params", &self.sample_params.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Bind each metric function to its sample params.
pub fn process_functions(
    metric: &MetricSpec,
    sample_params: Option<&SampleParamsInput>,
    n_samples: usize,
) -> Result<Vec<FunctionContainer>> {
    let containers = match metric {
        MetricSpec::Single { name, func } => {
            let params = match sample_params {
                None => SampleParams::new(),
                Some(SampleParamsInput::Flat(p)) => p.clone(),
                Some(SampleParamsInput::PerMetric(_)) => {
                    return Err(ConfigurationError::InvalidSampleParams {
                        expected: "a flat mapping of parameter name to array for a single metric",
                    }
                    .into());
                }
            };
            vec![FunctionContainer::new(name.clone(), Arc::clone(func), params)]
        }
        MetricSpec::Named(entries) => {
            if entries.is_empty() {
                return Err(ConfigurationError::NoMetrics.into());
            }
            let mut seen = std::collections::HashSet::new();
            if let Some((name, _)) = entries.iter().find(|(n, _)| !seen.insert(n.as_str())) {
                return Err(ConfigurationError::DuplicateMetricName { name: name.clone() }.into());
            }

            let per_metric = match sample_params {
                None => BTreeMap::new(),
                Some(SampleParamsInput::PerMetric(m)) => m.clone(),
                Some(SampleParamsInput::Flat(p)) if p.is_empty() => BTreeMap::new(),
                Some(SampleParamsInput::Flat(_)) => {
                    return Err(ConfigurationError::InvalidSampleParams {
                        expected: "a mapping of metric name to parameter mapping for a metric collection",
                    }
                    .into());
                }
            };
            let unknown: Vec<String> = per_metric
                .keys()
                .filter(|k| !entries.iter().any(|(n, _)| n == *k))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ConfigurationError::SampleParamKeysMismatch { keys: unknown }.into());
            }

            entries
                .iter()
                .map(|(name, func)| {
                    let params = per_metric.get(name).cloned().unwrap_or_default();
                    FunctionContainer::new(name.clone(), Arc::clone(func), params)
                })
                .collect()
        }
    };

    for container in &containers {
        container.sample_params.check_length(n_samples)?;
    }
    Ok(containers)
}
