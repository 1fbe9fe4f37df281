//! Result containers returned by the frame's readers.
//!
//! Every reader builds a [`Table`] internally (rows = subgroups, columns =
//! metric functions) and then collapses it into a [`MetricResult`] according
//! to two flags carried on the frame: whether the caller supplied a single
//! callable, and whether the rows are meaningful for this reader.

use crate::data::Level;
use serde::{Deserialize, Serialize};

/// The value returned by a metric function for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(x) => Some(*x),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(x: f64) -> Self {
        MetricValue::Scalar(x)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(v: Vec<f64>) -> Self {
        MetricValue::Vector(v)
    }
}

impl From<Vec<Vec<f64>>> for MetricValue {
    fn from(m: Vec<Vec<f64>>) -> Self {
        MetricValue::Matrix(m)
    }
}

/// A table cell. `None` marks a subgroup with no samples or an undefined
/// aggregate.
pub type Cell = Option<MetricValue>;

/// One row label: a class per index level.
pub type RowKey = Vec<Level>;

/// A possibly multi-level row index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIndex {
    pub names: Vec<String>,
    pub keys: Vec<RowKey>,
}

impl RowIndex {
    /// The index of a frame without control features: one unlabeled row.
    pub fn single() -> Self {
        Self {
            names: Vec::new(),
            keys: vec![Vec::new()],
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn position(&self, key: &[Level]) -> Option<usize> {
        self.keys.iter().position(|k| k.as_slice() == key)
    }
}

/// Rows indexed by subgroup, columns named after metric functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub index: RowIndex,
    pub columns: Vec<String>,
    /// Row-major cells, `cells[row][column]`.
    pub cells: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(index: RowIndex, columns: Vec<String>) -> Self {
        let cells = vec![vec![None; columns.len()]; index.len()];
        Self {
            index,
            columns,
            cells,
        }
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, key: &[Level], column: &str) -> Option<&MetricValue> {
        let row = self.index.position(key)?;
        let col = self.column_position(column)?;
        self.cells[row][col].as_ref()
    }

    /// Scalar value of one cell.
    pub fn get_scalar(&self, key: &[Level], column: &str) -> Option<f64> {
        self.get(key, column).and_then(MetricValue::as_scalar)
    }

    /// One metric's values across all rows.
    pub fn column(&self, name: &str) -> Option<Series> {
        let col = self.column_position(name)?;
        Some(self.column_at(col))
    }

    /// One row's values across all metrics.
    pub fn row(&self, key: &[Level]) -> Option<Series> {
        let row = self.index.position(key)?;
        Some(self.row_at(row))
    }

    fn column_at(&self, col: usize) -> Series {
        Series {
            axis: Axis::Groups(self.index.clone()),
            values: self.cells.iter().map(|r| r[col].clone()).collect(),
        }
    }

    fn row_at(&self, row: usize) -> Series {
        Series {
            axis: Axis::Metrics(self.columns.clone()),
            values: self.cells[row].clone(),
        }
    }

    /// Collapse the function axis when `single_function` is set, and the
    /// row axis when `keep_rows` is not.
    pub(crate) fn into_result(self, single_function: bool, keep_rows: bool) -> MetricResult {
        match (single_function, keep_rows) {
            (true, false) => {
                MetricResult::Scalar(self.cells.first().and_then(|r| r.first()).cloned().flatten())
            }
            (true, true) => MetricResult::Labeled1D(self.column_at(0)),
            (false, false) => MetricResult::Labeled1D(self.row_at(0)),
            (false, true) => MetricResult::Labeled2D(self),
        }
    }
}

/// The labels of a one-dimensional result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "labels", rename_all = "snake_case")]
pub enum Axis {
    /// Labeled by metric function name.
    Metrics(Vec<String>),
    /// Labeled by subgroup.
    Groups(RowIndex),
}

/// A labeled one-dimensional result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub axis: Axis,
    pub values: Vec<Cell>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for a subgroup label.
    pub fn get(&self, key: &[Level]) -> Option<&MetricValue> {
        match &self.axis {
            Axis::Groups(index) => self.values[index.position(key)?].as_ref(),
            Axis::Metrics(_) => None,
        }
    }

    /// Value for a metric name.
    pub fn get_metric(&self, name: &str) -> Option<&MetricValue> {
        match &self.axis {
            Axis::Metrics(names) => {
                let i = names.iter().position(|n| n == name)?;
                self.values[i].as_ref()
            }
            Axis::Groups(_) => None,
        }
    }

    pub fn get_scalar(&self, key: &[Level]) -> Option<f64> {
        self.get(key).and_then(MetricValue::as_scalar)
    }

    pub fn get_metric_scalar(&self, name: &str) -> Option<f64> {
        self.get_metric(name).and_then(MetricValue::as_scalar)
    }
}

/// A reader's result, shaped by how the metric was supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum MetricResult {
    Scalar(Cell),
    #[serde(rename = "labeled_1d")]
    Labeled1D(Series),
    #[serde(rename = "labeled_2d")]
    Labeled2D(Table),
}

impl MetricResult {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricResult::Scalar(cell) => cell.as_ref().and_then(MetricValue::as_scalar),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&Series> {
        match self {
            MetricResult::Labeled1D(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            MetricResult::Labeled2D(t) => Some(t),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
