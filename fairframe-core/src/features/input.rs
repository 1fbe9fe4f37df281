//! The accepted shapes of a partitioning-feature input.

use crate::error::{ConfigurationError, StateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw sensitive- or control-feature input.
///
/// Cells are JSON values so callers can mix strings, integers and booleans
/// the way tabular data arrives; only scalars are accepted as classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureInput {
    /// A flat sequence of scalar values.
    Flat { values: Vec<Value> },
    /// A single column with an optional name (`null` means unnamed).
    Named { name: Value, values: Vec<Value> },
    /// Name to column, in insertion order.
    Map { columns: Vec<(String, Vec<Value>)> },
    /// A table of named columns. Every column must carry a string name.
    Table { columns: Vec<(Value, Vec<Value>)> },
    /// An unnamed nested array of up to two (non-singleton) dimensions.
    Array { data: Value },
}

impl FeatureInput {
    pub fn flat<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        FeatureInput::Flat {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn named<I, T>(name: impl Into<Value>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        FeatureInput::Named {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn map<I, K, C, T>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        FeatureInput::Map {
            columns: columns
                .into_iter()
                .map(|(k, c)| (k.into(), c.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn table<I, K, C, T>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<Value>,
        C: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        FeatureInput::Table {
            columns: columns
                .into_iter()
                .map(|(k, c)| (k.into(), c.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn array(data: Value) -> Self {
        FeatureInput::Array { data }
    }

    /// An input holding no samples, used to initialise streaming frames.
    pub fn empty() -> Self {
        FeatureInput::Flat { values: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FeatureInput::Flat { values } | FeatureInput::Named { values, .. } => values.is_empty(),
            FeatureInput::Map { columns } => columns.iter().all(|(_, c)| c.is_empty()),
            FeatureInput::Table { columns } => columns.iter().all(|(_, c)| c.is_empty()),
            FeatureInput::Array { data } => match data {
                Value::Array(items) => items.is_empty(),
                _ => false,
            },
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            FeatureInput::Flat { .. } => "flat",
            FeatureInput::Named { .. } => "named",
            FeatureInput::Map { .. } => "map",
            FeatureInput::Table { .. } => "table",
            FeatureInput::Array { .. } => "array",
        }
    }

    /// Resolve the input into `(name, cells)` columns.
    ///
    /// Unnamed columns get `<base_name><position>`.
    pub fn columns(&self, base_name: &str) -> Result<Vec<(String, Vec<Value>)>, ConfigurationError> {
        match self {
            FeatureInput::Flat { values } => {
                if values.iter().any(|v| v.is_array() || v.is_object() || v.is_null()) {
                    return Err(ConfigurationError::NonScalarFeatureList);
                }
                Ok(vec![(format!("{base_name}0"), values.clone())])
            }
            FeatureInput::Named { name, values } => {
                let name = match name {
                    Value::Null => format!("{base_name}0"),
                    Value::String(s) => s.clone(),
                    other => return Err(bad_name(other)),
                };
                Ok(vec![(name, values.clone())])
            }
            FeatureInput::Map { columns } => Ok(columns.clone()),
            FeatureInput::Table { columns } => columns
                .iter()
                .map(|(name, values)| match name {
                    Value::String(s) => Ok((s.clone(), values.clone())),
                    other => Err(bad_name(other)),
                })
                .collect(),
            FeatureInput::Array { data } => {
                let columns = squeeze_columns(data)?;
                Ok(columns
                    .into_iter()
                    .enumerate()
                    .map(|(i, col)| (format!("{base_name}{i}"), col))
                    .collect())
            }
        }
    }

    /// Sample count of every column of one streaming batch.
    ///
    /// Arrays are measured along their outer dimension. Squeezing waits
    /// until the batches are concatenated, so a one-row batch of a 2-D
    /// array still counts as one sample.
    pub(crate) fn sample_counts(&self, base_name: &str) -> Result<Vec<(String, usize)>, ConfigurationError> {
        match self {
            FeatureInput::Array { data } => {
                let rows = match data {
                    Value::Array(items) => items.len(),
                    _ => 1,
                };
                Ok(vec![(format!("{base_name}0"), rows)])
            }
            other => Ok(other
                .columns(base_name)?
                .into_iter()
                .map(|(name, cells)| (name, cells.len()))
                .collect()),
        }
    }

    /// Concatenate batches that share one shape.
    pub(crate) fn concat(what: &'static str, batches: &[FeatureInput]) -> Result<FeatureInput, StateError> {
        let Some(first) = batches.first() else {
            return Ok(FeatureInput::empty());
        };
        let incompatible = |first: String, other: String| StateError::IncompatibleBatchTypes {
            what,
            first,
            other,
        };
        if let Some(other) = batches.iter().find(|b| b.variant_name() != first.variant_name()) {
            return Err(incompatible(
                first.variant_name().to_string(),
                other.variant_name().to_string(),
            ));
        }

        match first {
            FeatureInput::Flat { .. } => Ok(FeatureInput::Flat {
                values: batches
                    .iter()
                    .flat_map(|b| match b {
                        FeatureInput::Flat { values } => values.clone(),
                        _ => Vec::new(),
                    })
                    .collect(),
            }),
            FeatureInput::Named { name, .. } => {
                let mut values = Vec::new();
                for batch in batches {
                    if let FeatureInput::Named { name: n, values: v } = batch {
                        if n != name {
                            return Err(incompatible(name.to_string(), n.to_string()));
                        }
                        values.extend(v.iter().cloned());
                    }
                }
                Ok(FeatureInput::Named {
                    name: name.clone(),
                    values,
                })
            }
            FeatureInput::Map { columns } => {
                let names: Vec<Value> = columns.iter().map(|(k, _)| Value::from(k.as_str())).collect();
                let merged = concat_columns(batches, &names, |b| match b {
                    FeatureInput::Map { columns } => columns
                        .iter()
                        .map(|(k, c)| (Value::from(k.as_str()), c))
                        .collect(),
                    _ => Vec::new(),
                })
                .map_err(|(a, b)| incompatible(a, b))?;
                Ok(FeatureInput::Map {
                    columns: merged
                        .into_iter()
                        .map(|(k, c)| (k.as_str().unwrap_or_default().to_string(), c))
                        .collect(),
                })
            }
            FeatureInput::Table { columns } => {
                let names: Vec<Value> = columns.iter().map(|(k, _)| k.clone()).collect();
                let merged = concat_columns(batches, &names, |b| match b {
                    FeatureInput::Table { columns } => {
                        columns.iter().map(|(k, c)| (k.clone(), c)).collect()
                    }
                    _ => Vec::new(),
                })
                .map_err(|(a, b)| incompatible(a, b))?;
                Ok(FeatureInput::Table { columns: merged })
            }
            FeatureInput::Array { data } => {
                let inner = raw_shape(data).get(1..).map(<[usize]>::to_vec).unwrap_or_default();
                let mut items = Vec::new();
                for batch in batches {
                    if let FeatureInput::Array { data: d } = batch {
                        let shape = raw_shape(d);
                        let other = shape.get(1..).map(<[usize]>::to_vec).unwrap_or_default();
                        if other != inner {
                            return Err(incompatible(format!("{inner:?}"), format!("{other:?}")));
                        }
                        match d {
                            Value::Array(v) => items.extend(v.iter().cloned()),
                            scalar => items.push(scalar.clone()),
                        }
                    }
                }
                Ok(FeatureInput::Array {
                    data: Value::Array(items),
                })
            }
        }
    }
}

fn concat_columns<'a, F>(
    batches: &'a [FeatureInput],
    names: &[Value],
    columns_of: F,
) -> Result<Vec<(Value, Vec<Value>)>, (String, String)>
where
    F: Fn(&'a FeatureInput) -> Vec<(Value, &'a Vec<Value>)>,
{
    let mut merged: Vec<(Value, Vec<Value>)> =
        names.iter().map(|n| (n.clone(), Vec::new())).collect();
    for batch in batches {
        let cols = columns_of(batch);
        let batch_names: Vec<&Value> = cols.iter().map(|(k, _)| k).collect();
        if batch_names.len() != names.len() || batch_names.iter().zip(names).any(|(a, b)| *a != b) {
            return Err((format!("{names:?}"), format!("{batch_names:?}")));
        }
        for ((_, target), (_, source)) in merged.iter_mut().zip(cols) {
            target.extend(source.iter().cloned());
        }
    }
    Ok(merged)
}

fn bad_name(name: &Value) -> ConfigurationError {
    let kind = match name {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ConfigurationError::InvalidColumnName {
        name: name.to_string(),
        kind: kind.to_string(),
    }
}

/// Shape of a nested array, following the first element at each depth.
///
/// Irregular nesting is treated as a one-dimensional array of objects.
fn raw_shape(data: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = data;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    if is_regular(data, &shape) {
        shape
    } else {
        match data {
            Value::Array(items) => vec![items.len()],
            _ => Vec::new(),
        }
    }
}

fn is_regular(data: &Value, shape: &[usize]) -> bool {
    match (data, shape.split_first()) {
        (Value::Array(items), Some((len, rest))) => {
            items.len() == *len && items.iter().all(|item| is_regular(item, rest))
        }
        (Value::Array(_), None) => false,
        (_, None) => true,
        (_, Some(_)) => false,
    }
}

fn leaves(data: &Value, depth: usize, out: &mut Vec<Value>) {
    match data {
        Value::Array(items) if depth > 0 => {
            for item in items {
                leaves(item, depth - 1, out);
            }
        }
        other => out.push(other.clone()),
    }
}

/// Squeeze singleton dimensions and split the array into columns.
fn squeeze_columns(data: &Value) -> Result<Vec<Vec<Value>>, ConfigurationError> {
    let shape = raw_shape(data);
    let mut flat = Vec::new();
    leaves(data, shape.len(), &mut flat);

    let mut squeezed: Vec<usize> = shape.iter().copied().filter(|d| *d != 1).collect();
    if squeezed.is_empty() {
        squeezed.push(flat.len());
    }

    match squeezed.as_slice() {
        [_] => Ok(vec![flat]),
        [rows, cols] => Ok((0..*cols)
            .map(|c| (0..*rows).map(|r| flat[r * cols + c].clone()).collect())
            .collect()),
        dims => Err(ConfigurationError::TooManyDimensions { dims: dims.len() }),
    }
}
