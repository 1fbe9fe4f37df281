//! Reference metric functions.
//!
//! Every function follows the [`MetricFn`](crate::functions::MetricFn)
//! calling convention and honors an optional `sample_weight` param. Labels
//! are compared against a positive label of `1.0`.

use crate::data::Column;
use crate::functions::SampleParams;
use crate::result::MetricValue;
use anyhow::{Result, bail};

/// Name of the per-sample weight param.
pub const SAMPLE_WEIGHT: &str = "sample_weight";

const POS_LABEL: f64 = 1.0;

/// Per-sample weights, defaulting to one for every sample.
fn weights(params: &SampleParams, n: usize) -> Result<Vec<f64>> {
    match params.get(SAMPLE_WEIGHT) {
        None => Ok(vec![1.0; n]),
        Some(column) => {
            let w = column.require_values(SAMPLE_WEIGHT)?;
            if w.len() != n {
                bail!("'{SAMPLE_WEIGHT}' has {} entries for {n} samples", w.len());
            }
            Ok(w.to_vec())
        }
    }
}

fn paired<'a>(y_true: &'a Column, y_pred: &'a Column) -> Result<(&'a [f64], &'a [f64])> {
    let t = y_true.require_values("y_true")?;
    let p = y_pred.require_values("y_pred")?;
    if t.len() != p.len() {
        bail!("y_true has {} samples but y_pred has {}", t.len(), p.len());
    }
    Ok((t, p))
}

/// Weighted mean of `hit` over the samples selected by `keep`.
fn weighted_rate(
    t: &[f64],
    p: &[f64],
    w: &[f64],
    keep: impl Fn(f64, f64) -> bool,
    hit: impl Fn(f64, f64) -> bool,
) -> f64 {
    let mut total = 0.0;
    let mut hits = 0.0;
    for ((&yt, &yp), &wi) in t.iter().zip(p).zip(w) {
        if keep(yt, yp) {
            total += wi;
            if hit(yt, yp) {
                hits += wi;
            }
        }
    }
    if total == 0.0 { 0.0 } else { hits / total }
}

/// Fraction of samples where the prediction equals the label.
pub fn accuracy_score(y_true: &Column, y_pred: &Column, params: &SampleParams) -> Result<MetricValue> {
    let (t, p) = paired(y_true, y_pred)?;
    let w = weights(params, t.len())?;
    Ok(weighted_rate(t, p, &w, |_, _| true, |a, b| a == b).into())
}

/// Fraction of samples predicted positive. `y_true` only fixes the sample count.
pub fn selection_rate(y_true: &Column, y_pred: &Column, params: &SampleParams) -> Result<MetricValue> {
    let (t, p) = paired(y_true, y_pred)?;
    let w = weights(params, t.len())?;
    Ok(weighted_rate(t, p, &w, |_, _| true, |_, b| b == POS_LABEL).into())
}

/// Recall on the positive label; zero when there are no positives.
pub fn true_positive_rate(y_true: &Column, y_pred: &Column, params: &SampleParams) -> Result<MetricValue> {
    let (t, p) = paired(y_true, y_pred)?;
    let w = weights(params, t.len())?;
    Ok(weighted_rate(t, p, &w, |a, _| a == POS_LABEL, |_, b| b == POS_LABEL).into())
}

/// Share of negatives predicted positive; zero when there are no negatives.
pub fn false_positive_rate(y_true: &Column, y_pred: &Column, params: &SampleParams) -> Result<MetricValue> {
    let (t, p) = paired(y_true, y_pred)?;
    let w = weights(params, t.len())?;
    Ok(weighted_rate(t, p, &w, |a, _| a != POS_LABEL, |_, b| b == POS_LABEL).into())
}

pub fn mean_absolute_error(y_true: &Column, y_pred: &Column, params: &SampleParams) -> Result<MetricValue> {
    let (t, p) = paired(y_true, y_pred)?;
    let w = weights(params, t.len())?;
    let total: f64 = w.iter().sum();
    if total == 0.0 {
        bail!("mean_absolute_error needs a positive total weight");
    }
    let err: f64 = t
        .iter()
        .zip(p)
        .zip(&w)
        .map(|((a, b), wi)| (a - b).abs() * wi)
        .sum();
    Ok((err / total).into())
}

/// Number of samples. Ignores weights.
pub fn count(y_true: &Column, _y_pred: &Column, _params: &SampleParams) -> Result<MetricValue> {
    Ok((y_true.len() as f64).into())
}

/// Binary confusion matrix `[[tn, fp], [fn, tp]]`, weighted.
pub fn confusion_matrix(y_true: &Column, y_pred: &Column, params: &SampleParams) -> Result<MetricValue> {
    let (t, p) = paired(y_true, y_pred)?;
    let w = weights(params, t.len())?;
    let mut matrix = vec![vec![0.0; 2]; 2];
    for ((&yt, &yp), &wi) in t.iter().zip(p).zip(&w) {
        let row = usize::from(yt == POS_LABEL);
        let col = usize::from(yp == POS_LABEL);
        matrix[row][col] += wi;
    }
    Ok(matrix.into())
}
