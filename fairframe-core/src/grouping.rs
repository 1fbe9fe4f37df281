//! Cross-product subgroup indexing and masked metric evaluation.

use crate::data::{Column, Level};
use crate::error::Result;
use crate::features::Feature;
use crate::functions::FunctionContainer;
use crate::result::{RowIndex, Table};

/// Number of subgroups in the cross product of the given features.
pub fn subgroup_count<'a>(features: impl IntoIterator<Item = &'a Feature>) -> usize {
    features
        .into_iter()
        .map(|f| f.classes().len())
        .product()
}

/// Emit a warning when the cross product is large enough to be slow.
pub fn warn_on_subgroup_count(count: usize, threshold: usize) {
    if count > threshold {
        tracing::warn!(subgroups = count, threshold, "Found {count} subgroups. Evaluation may be slow");
    }
}

/// Row index over the cross product of every feature's classes.
///
/// The first feature varies slowest and the last varies fastest.
pub fn cross_product(rows: &[Feature]) -> RowIndex {
    let mut keys: Vec<Vec<Level>> = vec![Vec::new()];
    for feature in rows {
        keys = keys
            .iter()
            .flat_map(|prefix| {
                feature.classes().iter().map(move |class| {
                    let mut key = prefix.clone();
                    key.push(class.clone());
                    key
                })
            })
            .collect();
    }
    RowIndex {
        names: rows.iter().map(|f| f.name().to_string()).collect(),
        keys,
    }
}

/// Logical AND of each feature's mask for the matching key component.
pub fn mask_for_key(key: &[Level], rows: &[Feature], n_samples: usize) -> Vec<bool> {
    let mut mask = vec![true; n_samples];
    for (class, feature) in key.iter().zip(rows) {
        match feature.mask_for_class(class) {
            Some(class_mask) => {
                for (m, c) in mask.iter_mut().zip(class_mask) {
                    *m &= *c;
                }
            }
            None => mask.fill(false),
        }
    }
    mask
}

/// Evaluate every function on every non-empty subgroup of `rows`.
///
/// Cells of subgroups that select no samples stay empty and their
/// functions are never called.
pub fn compute_table(
    functions: &[FunctionContainer],
    y_true: &Column,
    y_pred: &Column,
    rows: &[Feature],
) -> Result<Table> {
    let index = cross_product(rows);
    let columns = functions.iter().map(|f| f.name().to_string()).collect();
    let mut table = Table::new(index, columns);

    let mut evaluated = 0usize;
    for (row, key) in table.index.keys.iter().enumerate() {
        let mask = mask_for_key(key, rows, y_true.len());
        if !mask.iter().any(|m| *m) {
            continue;
        }
        for (col, function) in functions.iter().enumerate() {
            table.cells[row][col] = Some(function.evaluate(y_true, y_pred, &mask)?);
        }
        evaluated += 1;
    }

    tracing::debug!(
        rows = table.index.len(),
        evaluated,
        functions = functions.len(),
        "Computed subgroup table"
    );
    Ok(table)
}

/// Metric values over the whole dataset, or per control stratum.
pub fn compute_overall(
    functions: &[FunctionContainer],
    y_true: &Column,
    y_pred: &Column,
    control: Option<&[Feature]>,
) -> Result<Table> {
    match control {
        Some(control) => compute_table(functions, y_true, y_pred, control),
        None => {
            let columns = functions.iter().map(|f| f.name().to_string()).collect();
            let mut table = Table::new(RowIndex::single(), columns);
            for (col, function) in functions.iter().enumerate() {
                table.cells[0][col] = Some(function.evaluate_all(y_true, y_pred)?);
            }
            Ok(table)
        }
    }
}

/// Metric values per subgroup; control features form the outer index levels.
pub fn compute_by_group(
    functions: &[FunctionContainer],
    y_true: &Column,
    y_pred: &Column,
    sensitive: &[Feature],
    control: Option<&[Feature]>,
) -> Result<Table> {
    let mut rows: Vec<Feature> = control.map(<[Feature]>::to_vec).unwrap_or_default();
    rows.extend(sensitive.iter().cloned());
    compute_table(functions, y_true, y_pred, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{MetricFn, SampleParams};
    use crate::result::MetricValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn feature(name: &str, cells: &[serde_json::Value]) -> Feature {
        Feature::from_column(name, cells).unwrap()
    }

    fn counting_len(calls: Arc<AtomicUsize>) -> FunctionContainer {
        let func: MetricFn = Arc::new(
            move |y_true: &Column, _: &Column, _: &SampleParams| -> anyhow::Result<MetricValue> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(MetricValue::Scalar(y_true.len() as f64))
            },
        );
        FunctionContainer::new("count", func, SampleParams::new())
    }

    #[test]
    fn test_cross_product_order() {
        let a = feature("a", &[json!("x"), json!("y")]);
        let b = feature("b", &[json!(1), json!(2)]);
        let index = cross_product(&[a, b]);
        assert_eq!(index.names, vec!["a", "b"]);
        assert_eq!(
            index.keys,
            vec![
                vec![Level::from("x"), Level::Int(1)],
                vec![Level::from("x"), Level::Int(2)],
                vec![Level::from("y"), Level::Int(1)],
                vec![Level::from("y"), Level::Int(2)],
            ]
        );
    }

    #[test]
    fn test_mask_for_key_is_logical_and() {
        let a = feature("a", &[json!("x"), json!("x"), json!("y")]);
        let b = feature("b", &[json!(1), json!(2), json!(1)]);
        let mask = mask_for_key(&[Level::from("x"), Level::Int(1)], &[a, b], 3);
        assert_eq!(mask, vec![true, false, false]);
    }

    #[test]
    fn test_empty_subgroups_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let a = feature("a", &[json!("x"), json!("y")]);
        let b = feature("b", &[json!(1), json!(2)]);
        let y = Column::from(vec![0.0, 1.0]);
        let table = compute_table(&[counting_len(calls.clone())], &y, &y, &[a, b]).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(table.get(&[Level::from("x"), Level::Int(2)], "count"), None);
        assert_eq!(
            table.get_scalar(&[Level::from("y"), Level::Int(2)], "count"),
            Some(1.0)
        );
    }

    #[test]
    fn test_overall_without_control_uses_whole_dataset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let y = Column::from(vec![0.0, 1.0, 1.0]);
        let table = compute_overall(&[counting_len(calls)], &y, &y, None).unwrap();
        assert_eq!(table.index.len(), 1);
        assert_eq!(table.get_scalar(&[], "count"), Some(3.0));
    }

    #[test]
    fn test_by_group_puts_control_first() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sf = vec![feature("sf", &[json!("a"), json!("b")])];
        let cf = vec![feature("cf", &[json!(0), json!(0)])];
        let y = Column::from(vec![0.0, 1.0]);
        let table = compute_by_group(&[counting_len(calls)], &y, &y, &sf, Some(&cf)).unwrap();
        assert_eq!(table.index.names, vec!["cf", "sf"]);
        assert_eq!(table.index.len(), 2);
    }

    #[test]
    fn test_subgroup_count() {
        let a = feature("a", &[json!("x"), json!("y"), json!("z")]);
        let b = feature("b", &[json!(1), json!(2), json!(2)]);
        assert_eq!(subgroup_count([&a, &b]), 6);
    }
}
