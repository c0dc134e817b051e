//! Column reductions over a [`crate::types::DataSet`].

use std::cmp::Ordering;

use crate::types::{DataSet, DataType, Value};

/// Built-in reduction operations over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Sum numeric values, ignoring nulls.
    Sum,
    /// Minimum numeric or date value, ignoring nulls.
    Min,
    /// Maximum numeric or date value, ignoring nulls.
    Max,
}

/// Reduce a column using a built-in [`ReduceOp`].
///
/// - Returns `None` if `column` does not exist in the schema.
/// - `Sum` is defined for numeric columns; `Min`/`Max` for numeric and date columns. Other column
///   types reduce to `Some(Value::Null)`, as does a column with no non-null values.
pub fn reduce(dataset: &DataSet, column: &str, op: ReduceOp) -> Option<Value> {
    let idx = dataset.schema.index_of(column)?;
    let data_type = dataset.schema.fields[idx].data_type;
    let values = dataset.rows.iter().filter_map(|row| row.get(idx));

    let out = match (op, data_type) {
        (ReduceOp::Sum, DataType::Int64) => values
            .filter_map(|v| match v {
                Value::Int64(x) => Some(*x),
                _ => None,
            })
            .reduce(i64::saturating_add)
            .map_or(Value::Null, Value::Int64),
        (ReduceOp::Sum, DataType::Float64) => values
            .filter_map(|v| match v {
                Value::Float64(x) => Some(*x),
                _ => None,
            })
            .reduce(|a, b| a + b)
            .map_or(Value::Null, Value::Float64),
        (ReduceOp::Min | ReduceOp::Max, DataType::Int64 | DataType::Float64 | DataType::Date) => {
            let want = if op == ReduceOp::Min { Ordering::Less } else { Ordering::Greater };
            values
                .filter(|v| matches!(v, Value::Int64(_) | Value::Float64(_) | Value::Date(_)))
                .fold(None::<&Value>, |best, v| match best {
                    Some(b) if compare(v, b) != Some(want) => Some(b),
                    _ => Some(v),
                })
                .cloned()
                .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    };
    Some(out)
}

/// Sum of a numeric column as `f64`; `0.0` for a missing column or no values.
pub fn column_total(dataset: &DataSet, column: &str) -> f64 {
    reduce(dataset, column, ReduceOp::Sum)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
        (Value::Float64(x), Value::Float64(y)) => x.partial_cmp(y),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
