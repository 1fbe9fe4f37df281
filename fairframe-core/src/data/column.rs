//! Numeric per-sample containers for labels, predictions and sample params.

use crate::error::{ConsistencyError, StateError};
use serde::{Deserialize, Serialize};

/// A per-sample numeric column.
///
/// Most inputs are one value per sample. Multi-output inputs, such as
/// per-class probabilities, keep one row per sample. Either way the first
/// axis is the sample axis and is what masks select along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Values(Vec<f64>),
    Rows(Vec<Vec<f64>>),
}

impl Column {
    /// Build a column from per-sample rows, squeezing a trailing singleton
    /// dimension.
    pub fn from_rows(name: &str, rows: Vec<Vec<f64>>) -> Result<Self, ConsistencyError> {
        let Some(width) = rows.first().map(Vec::len) else {
            return Ok(Column::Values(Vec::new()));
        };
        if let Some(other) = rows.iter().map(Vec::len).find(|w| *w != width) {
            return Err(ConsistencyError::RaggedColumn {
                name: name.to_string(),
                first: width,
                other,
            });
        }
        if width == 1 {
            Ok(Column::Values(rows.into_iter().map(|r| r[0]).collect()))
        } else {
            Ok(Column::Rows(rows))
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Column::Values(v) => v.len(),
            Column::Rows(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The flat values, if this column holds one value per sample.
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Column::Values(v) => Some(v),
            Column::Rows(_) => None,
        }
    }

    /// The flat values, or an error naming the metric input that was not flat.
    pub fn require_values(&self, what: &str) -> anyhow::Result<&[f64]> {
        self.values()
            .ok_or_else(|| anyhow::anyhow!("'{what}' must hold one value per sample"))
    }

    /// Select the samples where `mask` is true.
    pub fn select(&self, mask: &[bool]) -> Column {
        match self {
            Column::Values(v) => Column::Values(
                v.iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(x, _)| *x)
                    .collect(),
            ),
            Column::Rows(r) => Column::Rows(
                r.iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(row, _)| row.clone())
                    .collect(),
            ),
        }
    }

    pub(crate) fn kind(&self) -> String {
        match self {
            Column::Values(_) => "values".to_string(),
            Column::Rows(r) => format!("rows of width {}", r.first().map_or(0, Vec::len)),
        }
    }

    /// Concatenate batches of the same kind.
    pub(crate) fn concat(name: &'static str, batches: &[Column]) -> Result<Column, StateError> {
        let Some(first) = batches.first() else {
            return Ok(Column::Values(Vec::new()));
        };
        let first_kind = first.kind();
        if let Some(other) = batches.iter().map(Column::kind).find(|k| *k != first_kind) {
            return Err(StateError::IncompatibleBatchTypes {
                what: name,
                first: first_kind,
                other,
            });
        }
        Ok(match first {
            Column::Values(_) => Column::Values(
                batches
                    .iter()
                    .filter_map(Column::values)
                    .flat_map(|v| v.iter().copied())
                    .collect(),
            ),
            Column::Rows(_) => Column::Rows(
                batches
                    .iter()
                    .flat_map(|c| match c {
                        Column::Rows(r) => r.clone(),
                        Column::Values(_) => Vec::new(),
                    })
                    .collect(),
            ),
        })
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Values(v)
    }
}

impl From<&[f64]> for Column {
    fn from(v: &[f64]) -> Self {
        Column::Values(v.to_vec())
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Values(v.into_iter().map(|x| x as f64).collect())
    }
}

impl From<Vec<i32>> for Column {
    fn from(v: Vec<i32>) -> Self {
        Column::Values(v.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Column::Values(v.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect())
    }
}

/// Check that every named input has the same length as the first one.
pub fn check_consistent_length(lengths: &[(&str, usize)]) -> Result<(), ConsistencyError> {
    let Some((_, expected)) = lengths.first() else {
        return Ok(());
    };
    for (name, actual) in &lengths[1..] {
        if actual != expected {
            return Err(ConsistencyError::InconsistentLength {
                name: (*name).to_string(),
                expected: *expected,
                actual: *actual,
            });
        }
    }
    Ok(())
}
