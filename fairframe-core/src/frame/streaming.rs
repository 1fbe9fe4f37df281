//! Batch buffering for streaming frames.

use crate::data::{Column, check_consistent_length};
use crate::error::{MetricFrameError, Result, StateError};
use crate::features::{CONTROL_BASE_NAME, FeatureInput, SENSITIVE_BASE_NAME};
use crate::functions::SampleParamsInput;

/// One batch of samples for [`MetricFrame::add_batch`](super::MetricFrame::add_batch).
#[derive(Debug, Clone)]
pub struct Batch {
    pub(crate) y_true: Column,
    pub(crate) y_pred: Column,
    pub(crate) sensitive: FeatureInput,
    pub(crate) control: Option<FeatureInput>,
    pub(crate) sample_params: Option<SampleParamsInput>,
}

impl Batch {
    pub fn new(y_true: impl Into<Column>, y_pred: impl Into<Column>, sensitive: FeatureInput) -> Self {
        Self {
            y_true: y_true.into(),
            y_pred: y_pred.into(),
            sensitive,
            control: None,
            sample_params: None,
        }
    }

    pub fn control_features(mut self, control: FeatureInput) -> Self {
        self.control = Some(control);
        self
    }

    pub fn sample_params(mut self, params: impl Into<SampleParamsInput>) -> Self {
        self.sample_params = Some(params.into());
        self
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    fn check_lengths(&self) -> Result<()> {
        let mut lengths: Vec<(String, usize)> = vec![
            ("y_true".to_string(), self.y_true.len()),
            ("y_pred".to_string(), self.y_pred.len()),
        ];
        lengths.extend(self.sensitive.sample_counts(SENSITIVE_BASE_NAME)?);
        if let Some(control) = &self.control {
            lengths.extend(control.sample_counts(CONTROL_BASE_NAME)?);
        }
        if let Some(params) = &self.sample_params {
            lengths.extend(params.lengths());
        }
        let named: Vec<(&str, usize)> = lengths.iter().map(|(n, l)| (n.as_str(), *l)).collect();
        check_consistent_length(&named)?;
        Ok(())
    }
}

/// Whether control features accompany every batch or none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlMode {
    Absent,
    Required,
}

/// Concatenated batches, ready for a single computation.
#[derive(Debug, Clone)]
pub(crate) struct Dataset {
    pub y_true: Column,
    pub y_pred: Column,
    pub sensitive: FeatureInput,
    pub control: Option<FeatureInput>,
    pub sample_params: Option<SampleParamsInput>,
}

/// Buffers batches until the frame is read.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    control_mode: ControlMode,
    /// Params fixed at construction; never concatenated.
    frame_params: Option<SampleParamsInput>,
    y_true: Vec<Column>,
    y_pred: Vec<Column>,
    sensitive: Vec<FeatureInput>,
    control: Vec<FeatureInput>,
    sample_params: Vec<SampleParamsInput>,
}

impl Accumulator {
    pub fn new(control_mode: ControlMode, frame_params: Option<SampleParamsInput>) -> Self {
        Self {
            control_mode,
            frame_params,
            y_true: Vec::new(),
            y_pred: Vec::new(),
            sensitive: Vec::new(),
            control: Vec::new(),
            sample_params: Vec::new(),
        }
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn batch_count(&self) -> usize {
        self.y_true.len()
    }

    /// Validate a batch against itself and earlier batches, then buffer it.
    /// Nothing is buffered when validation fails.
    pub fn push(&mut self, batch: Batch) -> Result<()> {
        batch.check_lengths()?;

        match (self.control_mode, batch.control.is_some()) {
            (ControlMode::Absent, true) => {
                return Err(StateError::InconsistentControlFeatureUsage {
                    message: "MetricFrame expected `control_features=None` because it was initialized as such",
                }
                .into());
            }
            (ControlMode::Required, false) => {
                return Err(StateError::InconsistentControlFeatureUsage {
                    message: "MetricFrame expected `control_features` on every batch because it was initialized with them",
                }
                .into());
            }
            _ => {}
        }

        if self.frame_params.is_some() && batch.sample_params.is_some() {
            return Err(inconsistent_params(
                "MetricFrame was initialized with `sample_params` already set",
            ));
        }
        if self.batch_count() > 0 {
            match (self.sample_params.first(), &batch.sample_params) {
                (None, Some(_)) => {
                    return Err(inconsistent_params(
                        "MetricFrame did not receive `sample_params` on earlier batches",
                    ));
                }
                (Some(_), None) => {
                    return Err(inconsistent_params("MetricFrame expected `sample_params` to be supplied"));
                }
                (Some(first), Some(current)) if first.signature() != current.signature() => {
                    return Err(inconsistent_params(&format!(
                        "`sample_params` keys {} do not match earlier batches {}",
                        current.signature(),
                        first.signature()
                    )));
                }
                _ => {}
            }
        }

        tracing::debug!(
            samples = batch.len(),
            batches = self.batch_count() + 1,
            "Buffered batch"
        );
        self.y_true.push(batch.y_true);
        self.y_pred.push(batch.y_pred);
        self.sensitive.push(batch.sensitive);
        if let Some(control) = batch.control {
            self.control.push(control);
        }
        if let Some(params) = batch.sample_params {
            self.sample_params.push(params);
        }
        Ok(())
    }

    /// Concatenate every buffered batch.
    pub fn merge(&self) -> Result<Dataset> {
        if self.batch_count() == 0 {
            return Err(MetricFrameError::EmptyData);
        }
        let control = match self.control_mode {
            ControlMode::Absent => None,
            ControlMode::Required => Some(FeatureInput::concat("control_features", &self.control)?),
        };
        Ok(Dataset {
            y_true: Column::concat("y_true", &self.y_true)?,
            y_pred: Column::concat("y_pred", &self.y_pred)?,
            sensitive: FeatureInput::concat("sensitive_features", &self.sensitive)?,
            control,
            sample_params: match &self.frame_params {
                Some(params) => Some(params.clone()),
                None => SampleParamsInput::concat(&self.sample_params)?,
            },
        })
    }
}

fn inconsistent_params(message: &str) -> MetricFrameError {
    StateError::InconsistentSampleParams {
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::SampleParams;
    use pretty_assertions::assert_eq;

    fn batch(sf: &[&str]) -> Batch {
        let n = sf.len();
        Batch::new(vec![1.0; n], vec![0.0; n], FeatureInput::flat(sf.iter().copied()))
    }

    #[test]
    fn test_push_and_merge() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        acc.push(batch(&["a", "b"])).unwrap();
        acc.push(batch(&["c"])).unwrap();
        let data = acc.merge().unwrap();
        assert_eq!(data.y_true.len(), 3);
        assert_eq!(data.sensitive, FeatureInput::flat(["a", "b", "c"]));
        assert!(data.control.is_none());
    }

    #[test]
    fn test_merge_without_batches() {
        let acc = Accumulator::new(ControlMode::Absent, None);
        assert!(matches!(acc.merge(), Err(MetricFrameError::EmptyData)));
    }

    #[test]
    fn test_length_mismatch_is_not_buffered() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        let bad = Batch::new(vec![1.0, 0.0], vec![1.0], FeatureInput::flat(["a", "b"]));
        assert!(matches!(acc.push(bad), Err(MetricFrameError::Consistency(_))));
        assert_eq!(acc.batch_count(), 0);
    }

    #[test]
    fn test_control_features_on_absent_frame() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        let b = batch(&["a"]).control_features(FeatureInput::flat(["x"]));
        assert!(matches!(
            acc.push(b),
            Err(MetricFrameError::State(
                StateError::InconsistentControlFeatureUsage { .. }
            ))
        ));
    }

    #[test]
    fn test_missing_control_features_on_required_frame() {
        let mut acc = Accumulator::new(ControlMode::Required, None);
        assert!(matches!(
            acc.push(batch(&["a"])),
            Err(MetricFrameError::State(
                StateError::InconsistentControlFeatureUsage { .. }
            ))
        ));
    }

    #[test]
    fn test_sample_params_must_stay_consistent() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        acc.push(batch(&["a"]).sample_params(SampleParams::new().with("w", vec![1.0])))
            .unwrap();

        let missing = acc.push(batch(&["b"]));
        assert!(matches!(
            missing,
            Err(MetricFrameError::State(StateError::InconsistentSampleParams { .. }))
        ));

        let renamed = acc.push(batch(&["b"]).sample_params(SampleParams::new().with("v", vec![1.0])));
        assert!(matches!(
            renamed,
            Err(MetricFrameError::State(StateError::InconsistentSampleParams { .. }))
        ));
        assert_eq!(acc.batch_count(), 1);
    }

    #[test]
    fn test_sample_params_cannot_start_late() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        acc.push(batch(&["a"])).unwrap();
        let late = acc.push(batch(&["b"]).sample_params(SampleParams::new().with("w", vec![1.0])));
        assert!(matches!(
            late,
            Err(MetricFrameError::State(StateError::InconsistentSampleParams { .. }))
        ));
    }

    #[test]
    fn test_single_row_array_batch() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        acc.push(Batch::new(
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            FeatureInput::array(serde_json::json!([["a", 1], ["b", 2]])),
        ))
        .unwrap();
        acc.push(Batch::new(
            vec![1.0],
            vec![1.0],
            FeatureInput::array(serde_json::json!([["a", 2]])),
        ))
        .unwrap();
        let data = acc.merge().unwrap();
        let cols = data.sensitive.columns(SENSITIVE_BASE_NAME).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].1.len(), 3);
    }

    #[test]
    fn test_frame_params_are_not_concatenated() {
        let fixed = SampleParamsInput::from(SampleParams::new().with("w", vec![1.0, 2.0]));
        let mut acc = Accumulator::new(ControlMode::Absent, Some(fixed.clone()));
        acc.push(batch(&["a"])).unwrap();
        acc.push(batch(&["b"])).unwrap();
        assert_eq!(acc.merge().unwrap().sample_params, Some(fixed));

        let extra = acc.push(batch(&["c"]).sample_params(SampleParams::new().with("w", vec![1.0])));
        assert!(matches!(
            extra,
            Err(MetricFrameError::State(StateError::InconsistentSampleParams { .. }))
        ));
        assert_eq!(acc.batch_count(), 2);
    }

    #[test]
    fn test_incompatible_batches_fail_on_merge() {
        let mut acc = Accumulator::new(ControlMode::Absent, None);
        acc.push(batch(&["a"])).unwrap();
        acc.push(Batch::new(vec![1.0], vec![1.0], FeatureInput::named("sf", ["b"])))
            .unwrap();
        assert!(matches!(
            acc.merge(),
            Err(MetricFrameError::State(StateError::IncompatibleBatchTypes { .. }))
        ));
    }
}
