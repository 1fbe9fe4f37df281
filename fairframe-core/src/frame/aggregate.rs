//! Disparity aggregates over the sensitive-feature axis.
//!
//! Every aggregate collapses the sensitive levels of `by_group` and keeps
//! one row per control-feature combination (or a single unlabeled row when
//! there are no control features). Absent cells and NaN are skipped.

use crate::error::{AggregationError, StateError};
use crate::result::{Cell, MetricValue, RowIndex, Table};
use std::fmt;
use std::str::FromStr;

/// How `difference` and `ratio` compare subgroups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMethod {
    /// Compare the best and worst subgroups.
    #[default]
    BetweenGroups,
    /// Compare each subgroup with the overall value of its stratum.
    ToOverall,
}

impl FromStr for AggregationMethod {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "between_groups" => Ok(AggregationMethod::BetweenGroups),
            "to_overall" => Ok(AggregationMethod::ToOverall),
            other => Err(StateError::InvalidAggregationMethod {
                method: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMethod::BetweenGroups => f.write_str("between_groups"),
            AggregationMethod::ToOverall => f.write_str("to_overall"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Extreme {
    Max,
    Min,
}

type AggResult<T> = Result<T, AggregationError>;

/// Scalar content of a cell; `None` for absent or NaN.
fn scalar(table: &Table, row: usize, col: usize) -> AggResult<Option<f64>> {
    match &table.cells[row][col] {
        None => Ok(None),
        Some(MetricValue::Scalar(x)) if x.is_nan() => Ok(None),
        Some(MetricValue::Scalar(x)) => Ok(Some(*x)),
        Some(_) => Err(AggregationError::NonScalarValue {
            metric: table.columns[col].clone(),
        }),
    }
}

fn to_cell(value: Option<f64>) -> Cell {
    value.filter(|x| !x.is_nan()).map(MetricValue::Scalar)
}

/// Rows of `by_group` grouped by their control-feature prefix, in order of
/// first appearance.
fn strata(by_group: &Table, n_control: usize) -> (RowIndex, Vec<Vec<usize>>) {
    if n_control == 0 {
        return (RowIndex::single(), vec![(0..by_group.index.len()).collect()]);
    }
    let mut index = RowIndex {
        names: by_group.index.names[..n_control].to_vec(),
        keys: Vec::new(),
    };
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (row, key) in by_group.index.keys.iter().enumerate() {
        let prefix = &key[..n_control];
        match index.position(prefix) {
            Some(i) => groups[i].push(row),
            None => {
                index.keys.push(prefix.to_vec());
                groups.push(vec![row]);
            }
        }
    }
    (index, groups)
}

/// Row of `overall` matching a stratum key.
fn overall_row(overall: &Table, key: &[crate::data::Level]) -> Option<usize> {
    if key.is_empty() {
        (!overall.index.is_empty()).then_some(0)
    } else {
        overall.index.position(key)
    }
}

/// Fold each stratum's rows into one value per function.
fn fold_strata<F>(by_group: &Table, n_control: usize, mut reduce: F) -> AggResult<Table>
where
    F: FnMut(&[crate::data::Level], &[usize], usize) -> AggResult<Option<f64>>,
{
    let (index, groups) = strata(by_group, n_control);
    let mut result = Table::new(index, by_group.columns.clone());
    for (s, rows) in groups.iter().enumerate() {
        for col in 0..by_group.columns.len() {
            let value = reduce(&result.index.keys[s], rows, col)?;
            result.cells[s][col] = to_cell(value);
        }
    }
    Ok(result)
}

fn pick(acc: Option<f64>, x: f64, extreme: Extreme) -> Option<f64> {
    Some(match (acc, extreme) {
        (None, _) => x,
        (Some(a), Extreme::Max) => a.max(x),
        (Some(a), Extreme::Min) => a.min(x),
    })
}

pub(crate) fn group_extreme(by_group: &Table, n_control: usize, extreme: Extreme) -> AggResult<Table> {
    fold_strata(by_group, n_control, |_, rows, col| {
        let mut acc = None;
        for &row in rows {
            if let Some(x) = scalar(by_group, row, col)? {
                acc = pick(acc, x, extreme);
            }
        }
        Ok(acc)
    })
}

/// Combine two aggregate tables of identical shape cell by cell.
fn combine(left: Table, right: &Table, op: impl Fn(f64, f64) -> f64) -> AggResult<Table> {
    let mut result = left;
    for row in 0..result.index.len() {
        for col in 0..result.columns.len() {
            let value = match (scalar(&result, row, col)?, scalar(right, row, col)?) {
                (Some(a), Some(b)) => Some(op(a, b)),
                _ => None,
            };
            result.cells[row][col] = to_cell(value);
        }
    }
    Ok(result)
}

pub(crate) fn difference(
    by_group: &Table,
    overall: &Table,
    n_control: usize,
    method: AggregationMethod,
) -> AggResult<Table> {
    match method {
        AggregationMethod::BetweenGroups => {
            let max = group_extreme(by_group, n_control, Extreme::Max)?;
            let min = group_extreme(by_group, n_control, Extreme::Min)?;
            combine(max, &min, |a, b| a - b)
        }
        AggregationMethod::ToOverall => fold_strata(by_group, n_control, |key, rows, col| {
            let Some(reference) = overall_row(overall, key) else {
                return Ok(None);
            };
            let Some(base) = scalar(overall, reference, col)? else {
                return Ok(None);
            };
            let mut acc = None;
            for &row in rows {
                if let Some(x) = scalar(by_group, row, col)? {
                    acc = pick(acc, (x - base).abs(), Extreme::Max);
                }
            }
            Ok(acc)
        }),
    }
}

pub(crate) fn ratio(
    by_group: &Table,
    overall: &Table,
    n_control: usize,
    method: AggregationMethod,
) -> AggResult<Table> {
    match method {
        AggregationMethod::BetweenGroups => {
            let min = group_extreme(by_group, n_control, Extreme::Min)?;
            let max = group_extreme(by_group, n_control, Extreme::Max)?;
            combine(min, &max, |a, b| a / b)
        }
        AggregationMethod::ToOverall => fold_strata(by_group, n_control, |key, rows, col| {
            let Some(reference) = overall_row(overall, key) else {
                return Ok(None);
            };
            let Some(base) = scalar(overall, reference, col)? else {
                return Ok(None);
            };
            let mut acc = None;
            for &row in rows {
                if let Some(x) = scalar(by_group, row, col)? {
                    let r = x / base;
                    let r = r.min(1.0 / r);
                    if !r.is_nan() {
                        acc = pick(acc, r, Extreme::Min);
                    }
                }
            }
            Ok(acc)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Level;
    use pretty_assertions::assert_eq;

    fn s(x: f64) -> Cell {
        Some(MetricValue::Scalar(x))
    }

    /// Two control strata (c0, c1) by two sensitive groups (a, b).
    fn stratified() -> (Table, Table) {
        let index = RowIndex {
            names: vec!["cf".into(), "sf".into()],
            keys: vec![
                vec![Level::from("c0"), Level::from("a")],
                vec![Level::from("c0"), Level::from("b")],
                vec![Level::from("c1"), Level::from("a")],
                vec![Level::from("c1"), Level::from("b")],
            ],
        };
        let mut by_group = Table::new(index, vec!["m".into()]);
        by_group.cells = vec![vec![s(0.2)], vec![s(0.8)], vec![s(0.5)], vec![None]];

        let overall_index = RowIndex {
            names: vec!["cf".into()],
            keys: vec![vec![Level::from("c0")], vec![Level::from("c1")]],
        };
        let mut overall = Table::new(overall_index, vec!["m".into()]);
        overall.cells = vec![vec![s(0.4)], vec![s(0.5)]];
        (by_group, overall)
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            "to_overall".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::ToOverall
        );
        assert!(matches!(
            "worst".parse::<AggregationMethod>(),
            Err(StateError::InvalidAggregationMethod { .. })
        ));
    }

    #[test]
    fn test_group_extremes_per_stratum() {
        let (by_group, _) = stratified();
        let max = group_extreme(&by_group, 1, Extreme::Max).unwrap();
        let min = group_extreme(&by_group, 1, Extreme::Min).unwrap();
        assert_eq!(max.index.keys, vec![vec![Level::from("c0")], vec![Level::from("c1")]]);
        assert_eq!(max.cells, vec![vec![s(0.8)], vec![s(0.5)]]);
        assert_eq!(min.cells, vec![vec![s(0.2)], vec![s(0.5)]]);
    }

    #[test]
    fn test_difference_to_overall_broadcasts_per_stratum() {
        let (by_group, overall) = stratified();
        let diff = difference(&by_group, &overall, 1, AggregationMethod::ToOverall).unwrap();
        let c0 = diff.get_scalar(&[Level::from("c0")], "m").unwrap();
        assert!((c0 - 0.4).abs() < 1e-12);
        assert_eq!(diff.get_scalar(&[Level::from("c1")], "m"), Some(0.0));
    }

    #[test]
    fn test_ratio_to_overall_folds_above_one() {
        let (by_group, overall) = stratified();
        let ratio = ratio(&by_group, &overall, 1, AggregationMethod::ToOverall).unwrap();
        // c0: 0.2/0.4 = 0.5 and 0.8/0.4 = 2 -> 0.5
        assert_eq!(ratio.get_scalar(&[Level::from("c0")], "m"), Some(0.5));
        assert_eq!(ratio.get_scalar(&[Level::from("c1")], "m"), Some(1.0));
    }

    #[test]
    fn test_ratio_to_overall_takes_smaller_of_ratio_and_inverse() {
        let index = RowIndex {
            names: vec!["sf".into()],
            keys: vec![vec![Level::from("a")], vec![Level::from("b")]],
        };
        let mut by_group = Table::new(index, vec!["m".into()]);
        by_group.cells = vec![vec![s(-1.0)], vec![s(4.0)]];
        let mut overall = Table::new(RowIndex::single(), vec!["m".into()]);
        overall.cells = vec![vec![s(3.0)]];

        // a: -1/3 -> min(-1/3, -3) = -3; b: 4/3 -> 3/4
        let ratio = ratio(&by_group, &overall, 0, AggregationMethod::ToOverall).unwrap();
        let value = ratio.get_scalar(&[], "m").unwrap();
        assert!((value + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_without_control_single_row() {
        let (by_group, _) = stratified();
        let max = group_extreme(&by_group, 0, Extreme::Max).unwrap();
        assert_eq!(max.index, RowIndex::single());
        assert_eq!(max.cells, vec![vec![s(0.8)]]);
    }

    #[test]
    fn test_all_missing_stratum_is_absent() {
        let index = RowIndex {
            names: vec!["sf".into()],
            keys: vec![vec![Level::from("a")]],
        };
        let by_group = Table::new(index, vec!["m".into()]);
        let max = group_extreme(&by_group, 0, Extreme::Max).unwrap();
        assert_eq!(max.cells, vec![vec![None]]);
    }

    #[test]
    fn test_non_scalar_cells_fail() {
        let index = RowIndex {
            names: vec!["sf".into()],
            keys: vec![vec![Level::from("a")]],
        };
        let mut by_group = Table::new(index, vec!["cm".into()]);
        by_group.cells = vec![vec![Some(MetricValue::Vector(vec![1.0, 2.0]))]];
        let err = group_extreme(&by_group, 0, Extreme::Min).unwrap_err();
        assert!(matches!(err, AggregationError::NonScalarValue { metric } if metric == "cm"));
    }
}
