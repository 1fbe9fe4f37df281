//! The disaggregated metric frame.
//!
//! A [`MetricFrame`] evaluates one or more metric functions on the whole
//! dataset (`overall`) and on every subgroup induced by the sensitive
//! features (`by_group`). Control features split both results into strata
//! that are never aggregated over.
//!
//! Frames are either eager, computed during [`MetricFrameBuilder::build`],
//! or streaming, where batches are buffered by [`MetricFrame::add_batch`]
//! and merged into a single computation on the first read. Every reader
//! brings the cache up to date before answering, so readers take
//! `&mut self`.

mod aggregate;
mod streaming;

pub use aggregate::AggregationMethod;
pub use streaming::Batch;

use crate::config::FrameConfig;
use crate::data::{Column, check_consistent_length};
use crate::error::{ConfigurationError, MetricFrameError, Result};
use crate::features::{
    CONTROL_BASE_NAME, Feature, FeatureInput, SENSITIVE_BASE_NAME, build_features,
    check_unique_names,
};
use crate::functions::{MetricSpec, SampleParamsInput, process_functions};
use crate::grouping::{compute_by_group, compute_overall, subgroup_count, warn_on_subgroup_count};
use crate::result::{MetricResult, Table};
use aggregate::Extreme;
use streaming::{Accumulator, ControlMode, Dataset};

/// Lifecycle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Streaming frame without any batch.
    Empty,
    /// Batches were added since the last computation.
    Accumulating,
    /// Cached results are current.
    Computed,
}

#[derive(Debug, Clone)]
struct Computed {
    overall: Table,
    by_group: Table,
    sensitive_names: Vec<String>,
    control_names: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
enum CacheState {
    Dirty,
    Fresh(Box<Computed>),
}

#[derive(Debug, Clone)]
enum Source {
    Eager(Box<Dataset>),
    Streaming(Accumulator),
}

/// Collection of disaggregated metric values.
#[derive(Debug, Clone)]
pub struct MetricFrame {
    metric: MetricSpec,
    config: FrameConfig,
    source: Source,
    cache: CacheState,
}

/// Options for constructing a [`MetricFrame`].
#[derive(Debug, Clone)]
pub struct MetricFrameBuilder {
    metric: MetricSpec,
    sensitive: Option<FeatureInput>,
    control: Option<FeatureInput>,
    sample_params: Option<SampleParamsInput>,
    streaming: bool,
    config: FrameConfig,
}

impl MetricFrameBuilder {
    pub fn sensitive_features(mut self, features: FeatureInput) -> Self {
        self.sensitive = Some(features);
        self
    }

    pub fn control_features(mut self, features: FeatureInput) -> Self {
        self.control = Some(features);
        self
    }

    pub fn sample_params(mut self, params: impl Into<SampleParamsInput>) -> Self {
        self.sample_params = Some(params.into());
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn config(mut self, config: FrameConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the frame. Eager frames compute immediately; streaming frames
    /// require every data input to be empty. Sample params given to a
    /// streaming frame apply to the merged data and batches may not carry
    /// their own.
    pub fn build(self, y_true: impl Into<Column>, y_pred: impl Into<Column>) -> Result<MetricFrame> {
        let y_true = y_true.into();
        let y_pred = y_pred.into();

        if self.streaming {
            let non_empty = !y_true.is_empty()
                || !y_pred.is_empty()
                || self.sensitive.as_ref().is_some_and(|f| !f.is_empty())
                || self.control.as_ref().is_some_and(|f| !f.is_empty());
            if non_empty {
                return Err(ConfigurationError::NonEmptyStreamingInit.into());
            }
            let mode = if self.control.is_some() {
                ControlMode::Required
            } else {
                ControlMode::Absent
            };
            return Ok(MetricFrame {
                metric: self.metric,
                config: self.config,
                source: Source::Streaming(Accumulator::new(
                    mode,
                    self.sample_params.filter(|p| !p.is_empty()),
                )),
                cache: CacheState::Dirty,
            });
        }

        let sensitive = match self.sensitive {
            Some(f) if !f.is_empty() && !y_true.is_empty() && !y_pred.is_empty() => f,
            _ => return Err(ConfigurationError::EmptyData.into()),
        };
        let dataset = Dataset {
            y_true,
            y_pred,
            sensitive,
            control: self.control,
            sample_params: self.sample_params,
        };
        let computed = compute(&self.metric, &dataset, &self.config)?;
        Ok(MetricFrame {
            metric: self.metric,
            config: self.config,
            source: Source::Eager(Box::new(dataset)),
            cache: CacheState::Fresh(Box::new(computed)),
        })
    }

    /// Build an empty streaming frame.
    pub fn build_streaming(self) -> Result<MetricFrame> {
        self.streaming(true)
            .build(Column::Values(Vec::new()), Column::Values(Vec::new()))
    }
}

/// Normalize the features, bind the functions and evaluate both tables.
fn compute(metric: &MetricSpec, data: &Dataset, config: &FrameConfig) -> Result<Computed> {
    let n = data.y_true.len();
    check_consistent_length(&[("y_true", n), ("y_pred", data.y_pred.len())])?;

    let sensitive = build_features(SENSITIVE_BASE_NAME, &data.sensitive, n)?;
    if sensitive.is_empty() {
        return Err(ConfigurationError::NoFeatures.into());
    }
    let control = match &data.control {
        Some(input) => Some(build_features(CONTROL_BASE_NAME, input, n)?).filter(|c| !c.is_empty()),
        None => None,
    };
    check_unique_names(&sensitive, control.as_deref())?;

    let functions = process_functions(metric, data.sample_params.as_ref(), n)?;

    let count = subgroup_count(sensitive.iter().chain(control.iter().flatten()));
    warn_on_subgroup_count(count, config.subgroup_warning_threshold);

    tracing::debug!(
        samples = n,
        functions = functions.len(),
        subgroups = count,
        "Computing metric frame"
    );
    let overall = compute_overall(&functions, &data.y_true, &data.y_pred, control.as_deref())?;
    let by_group = compute_by_group(
        &functions,
        &data.y_true,
        &data.y_pred,
        &sensitive,
        control.as_deref(),
    )?;

    Ok(Computed {
        overall,
        by_group,
        sensitive_names: names(&sensitive),
        control_names: control.as_deref().map(names),
    })
}

fn names(features: &[Feature]) -> Vec<String> {
    features.iter().map(|f| f.name().to_string()).collect()
}

impl MetricFrame {
    /// Start building a frame for `metric`.
    pub fn builder(metric: MetricSpec) -> MetricFrameBuilder {
        MetricFrameBuilder {
            metric,
            sensitive: None,
            control: None,
            sample_params: None,
            streaming: false,
            config: FrameConfig::default(),
        }
    }

    /// Build an eager frame with sensitive features only.
    pub fn new(
        metric: MetricSpec,
        y_true: impl Into<Column>,
        y_pred: impl Into<Column>,
        sensitive_features: FeatureInput,
    ) -> Result<Self> {
        Self::builder(metric)
            .sensitive_features(sensitive_features)
            .build(y_true, y_pred)
    }

    /// Buffer a batch. Cached results are invalidated.
    pub fn add_batch(&mut self, batch: Batch) -> Result<()> {
        match &mut self.source {
            Source::Eager(_) => Err(crate::error::StateError::NotStreaming.into()),
            Source::Streaming(acc) => {
                acc.push(batch)?;
                if matches!(self.cache, CacheState::Fresh(_)) {
                    tracing::debug!("Invalidated cached metric results");
                }
                self.cache = CacheState::Dirty;
                Ok(())
            }
        }
    }

    pub fn state(&self) -> FrameState {
        match (&self.source, &self.cache) {
            (_, CacheState::Fresh(_)) => FrameState::Computed,
            (Source::Streaming(acc), CacheState::Dirty) if acc.batch_count() == 0 => FrameState::Empty,
            _ => FrameState::Accumulating,
        }
    }

    /// Whether the metric was supplied as a single callable.
    pub fn is_single_function(&self) -> bool {
        self.metric.is_single()
    }

    /// Whether results are stratified by control features.
    pub fn has_control_features(&self) -> bool {
        match (&self.cache, &self.source) {
            (CacheState::Fresh(c), _) => c.control_names.is_some(),
            (CacheState::Dirty, Source::Streaming(acc)) => acc.control_mode() == ControlMode::Required,
            (CacheState::Dirty, Source::Eager(data)) => data.control.is_some(),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Bring the cache up to date, merging buffered batches if needed.
    fn recompute(&mut self) -> Result<&Computed> {
        if matches!(self.cache, CacheState::Dirty) {
            let data = match &self.source {
                Source::Eager(data) => data.as_ref().clone(),
                Source::Streaming(acc) => acc.merge()?,
            };
            let computed = compute(&self.metric, &data, &self.config)?;
            self.cache = CacheState::Fresh(Box::new(computed));
        }
        match &self.cache {
            CacheState::Fresh(computed) => Ok(computed),
            CacheState::Dirty => Err(MetricFrameError::EmptyData),
        }
    }

    fn shape(&self, table: Table, keep_rows: bool) -> MetricResult {
        table.into_result(self.metric.is_single(), keep_rows)
    }

    /// Metrics over the whole dataset, or per control stratum.
    pub fn overall(&mut self) -> Result<MetricResult> {
        let computed = self.recompute()?;
        let (table, keep_rows) = (computed.overall.clone(), computed.control_names.is_some());
        Ok(self.shape(table, keep_rows))
    }

    /// Metrics per subgroup. Subgroups with no samples have absent cells.
    pub fn by_group(&mut self) -> Result<MetricResult> {
        let table = self.recompute()?.by_group.clone();
        Ok(self.shape(table, true))
    }

    /// Names of the control-feature index levels, if any.
    pub fn control_levels(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.recompute()?.control_names.clone())
    }

    /// Names of the sensitive-feature index levels.
    pub fn sensitive_levels(&mut self) -> Result<Vec<String>> {
        Ok(self.recompute()?.sensitive_names.clone())
    }

    fn aggregate<F>(&mut self, op: F) -> Result<MetricResult>
    where
        F: FnOnce(&Table, &Table, usize) -> Result<Table, crate::error::AggregationError>,
    {
        let computed = self.recompute()?;
        let n_control = computed.control_names.as_ref().map_or(0, Vec::len);
        let table = op(&computed.by_group, &computed.overall, n_control)?;
        Ok(self.shape(table, n_control > 0))
    }

    /// Maximum over the sensitive subgroups for each function.
    pub fn group_max(&mut self) -> Result<MetricResult> {
        self.aggregate(|by_group, _, n| aggregate::group_extreme(by_group, n, Extreme::Max))
    }

    /// Minimum over the sensitive subgroups for each function.
    pub fn group_min(&mut self) -> Result<MetricResult> {
        self.aggregate(|by_group, _, n| aggregate::group_extreme(by_group, n, Extreme::Min))
    }

    /// Largest absolute difference, between groups or to the overall value.
    pub fn difference(&mut self, method: AggregationMethod) -> Result<MetricResult> {
        self.aggregate(|by_group, overall, n| aggregate::difference(by_group, overall, n, method))
    }

    /// Smallest ratio (at most one), between groups or to the overall value.
    pub fn ratio(&mut self, method: AggregationMethod) -> Result<MetricResult> {
        self.aggregate(|by_group, overall, n| aggregate::ratio(by_group, overall, n, method))
    }

    /// [`difference`](Self::difference) with the configured default method.
    pub fn difference_default(&mut self) -> Result<MetricResult> {
        let method = self.config.default_aggregation()?;
        self.difference(method)
    }

    /// [`ratio`](Self::ratio) with the configured default method.
    pub fn ratio_default(&mut self) -> Result<MetricResult> {
        let method = self.config.default_aggregation()?;
        self.ratio(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Level;
    use crate::error::StateError;
    use crate::metrics::accuracy_score;
    use pretty_assertions::assert_eq;

    fn frame() -> MetricFrame {
        MetricFrame::new(
            MetricSpec::single(accuracy_score),
            vec![0, 1, 0, 1],
            vec![0, 1, 1, 1],
            FeatureInput::flat(["a", "a", "b", "b"]),
        )
        .unwrap()
    }

    #[test]
    fn test_eager_frame_is_computed() {
        let mf = frame();
        assert_eq!(mf.state(), FrameState::Computed);
        assert!(mf.is_single_function());
        assert!(!mf.has_control_features());
    }

    #[test]
    fn test_overall_and_by_group() {
        let mut mf = frame();
        assert_eq!(mf.overall().unwrap().as_scalar(), Some(0.75));
        let by_group = mf.by_group().unwrap();
        let series = by_group.as_series().unwrap();
        assert_eq!(series.get_scalar(&[Level::from("a")]), Some(1.0));
        assert_eq!(series.get_scalar(&[Level::from("b")]), Some(0.5));
    }

    #[test]
    fn test_levels() {
        let mut mf = frame();
        assert_eq!(mf.sensitive_levels().unwrap(), vec!["sensitive_feature_0"]);
        assert_eq!(mf.control_levels().unwrap(), None);
    }

    #[test]
    fn test_empty_eager_data_rejected() {
        let err = MetricFrame::new(
            MetricSpec::single(accuracy_score),
            Vec::<f64>::new(),
            Vec::<f64>::new(),
            FeatureInput::empty(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MetricFrameError::Configuration(ConfigurationError::EmptyData)
        ));
    }

    #[test]
    fn test_add_batch_on_eager_frame() {
        let mut mf = frame();
        let err = mf
            .add_batch(Batch::new(vec![1.0], vec![1.0], FeatureInput::flat(["a"])))
            .unwrap_err();
        assert!(matches!(err, MetricFrameError::State(StateError::NotStreaming)));
    }

    #[test]
    fn test_streaming_state_machine() {
        let mut mf = MetricFrame::builder(MetricSpec::single(accuracy_score))
            .build_streaming()
            .unwrap();
        assert_eq!(mf.state(), FrameState::Empty);
        assert!(matches!(mf.overall(), Err(MetricFrameError::EmptyData)));

        mf.add_batch(Batch::new(vec![0, 1], vec![0, 1], FeatureInput::flat(["a", "a"])))
            .unwrap();
        assert_eq!(mf.state(), FrameState::Accumulating);
        assert_eq!(mf.overall().unwrap().as_scalar(), Some(1.0));
        assert_eq!(mf.state(), FrameState::Computed);

        mf.add_batch(Batch::new(vec![0, 1], vec![1, 1], FeatureInput::flat(["b", "b"])))
            .unwrap();
        assert_eq!(mf.state(), FrameState::Accumulating);
        assert_eq!(mf.overall().unwrap().as_scalar(), Some(0.75));
    }

    #[test]
    fn test_streaming_init_must_be_empty() {
        let err = MetricFrame::builder(MetricSpec::single(accuracy_score))
            .sensitive_features(FeatureInput::flat(["a"]))
            .streaming(true)
            .build(vec![1.0], vec![1.0])
            .unwrap_err();
        assert!(matches!(
            err,
            MetricFrameError::Configuration(ConfigurationError::NonEmptyStreamingInit)
        ));
    }

    #[test]
    fn test_streaming_frame_wide_sample_params() {
        use crate::functions::SampleParams;
        use crate::metrics::SAMPLE_WEIGHT;

        let mut mf = MetricFrame::builder(MetricSpec::single(accuracy_score))
            .sample_params(SampleParams::new().with(SAMPLE_WEIGHT, vec![3.0, 1.0]))
            .build_streaming()
            .unwrap();
        mf.add_batch(Batch::new(vec![0], vec![0], FeatureInput::flat(["a"])))
            .unwrap();
        mf.add_batch(Batch::new(vec![1], vec![0], FeatureInput::flat(["a"])))
            .unwrap();
        assert_eq!(mf.overall().unwrap().as_scalar(), Some(0.75));

        let err = mf
            .add_batch(
                Batch::new(vec![1], vec![1], FeatureInput::flat(["a"]))
                    .sample_params(SampleParams::new().with(SAMPLE_WEIGHT, vec![1.0])),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MetricFrameError::State(StateError::InconsistentSampleParams { .. })
        ));
    }

    #[test]
    fn test_default_method_from_config() {
        let config = FrameConfig {
            default_method: "to_overall".into(),
            ..FrameConfig::default()
        };
        let mut mf = MetricFrame::builder(MetricSpec::single(accuracy_score))
            .sensitive_features(FeatureInput::flat(["a", "a", "b", "b"]))
            .config(config)
            .build(vec![0, 1, 0, 1], vec![0, 1, 1, 1])
            .unwrap();
        assert_eq!(mf.difference_default().unwrap().as_scalar(), Some(0.25));
    }
}
