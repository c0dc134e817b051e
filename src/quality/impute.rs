//! Policy-driven imputation of missing values, followed by per-column normalization.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::{DatasetProfile, FillPolicy, Normalizer};
use crate::types::{coerce_date, DataSet, DataType, Value};

/// Number of cells filled and normalized per column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImputationStats {
    /// Filled cell counts keyed by column; columns with no fills are absent.
    pub filled: BTreeMap<String, usize>,
    /// Cells a normalizer changed, keyed by column.
    pub normalized: BTreeMap<String, usize>,
}

impl ImputationStats {
    /// Total filled cells.
    pub fn total_filled(&self) -> usize {
        self.filled.values().sum()
    }

    /// Total normalized cells.
    pub fn total_normalized(&self) -> usize {
        self.normalized.values().sum()
    }
}

/// Resolved fill for one column.
enum Fill {
    Zero(DataType),
    Text(String),
    Label { prefix: String, id: Option<usize> },
    Date,
    DateFrom(Option<usize>),
}

/// Fills missing values according to each column's [`FillPolicy`], then applies each column's
/// [`Normalizer`].
#[derive(Debug, Clone, Copy)]
pub struct Imputer<'a> {
    profile: &'a DatasetProfile,
    processing_date: NaiveDate,
    date_format: &'a str,
}

impl<'a> Imputer<'a> {
    /// Imputer for `profile`, filling dates with `processing_date`.
    pub fn new(profile: &'a DatasetProfile, processing_date: NaiveDate, date_format: &'a str) -> Self {
        Self {
            profile,
            processing_date,
            date_format,
        }
    }

    /// Return a copy of `dataset` with missing values filled and normalizers applied, plus
    /// per-column counts.
    ///
    /// Fills only touch missing values. Columns absent from the dataset schema are ignored.
    pub fn impute(&self, dataset: &DataSet) -> (DataSet, ImputationStats) {
        let id_idx = self
            .profile
            .id_column
            .as_deref()
            .and_then(|c| dataset.schema.index_of(c));

        let plan: Vec<(usize, Fill)> = self
            .profile
            .columns
            .iter()
            .filter_map(|spec| {
                let idx = dataset.schema.index_of(&spec.field.name)?;
                let fill = match &spec.fill {
                    FillPolicy::Keep => return None,
                    FillPolicy::Zero => Fill::Zero(spec.field.data_type),
                    FillPolicy::Placeholder { text } => Fill::Text(text.clone()),
                    FillPolicy::SynthesizedLabel { prefix } => Fill::Label {
                        prefix: prefix.clone(),
                        id: id_idx,
                    },
                    FillPolicy::ProcessingDate => Fill::Date,
                    FillPolicy::FromColumn { column } => Fill::DateFrom(dataset.schema.index_of(column)),
                };
                Some((idx, fill))
            })
            .collect();

        let normalizers: Vec<(usize, &Normalizer)> = self
            .profile
            .columns
            .iter()
            .filter_map(|spec| Some((dataset.schema.index_of(&spec.field.name)?, spec.normalize.as_ref()?)))
            .collect();

        let width = dataset.schema.fields.len();
        let mut counts = vec![0usize; width];
        let mut changed = vec![0usize; width];
        let mut row_number = 0usize;
        let imputed = dataset.map_rows(|row| {
            row_number += 1;
            let mut out = row.to_vec();
            for (idx, fill) in &plan {
                if !row[*idx].is_missing() {
                    continue;
                }
                out[*idx] = match fill {
                    Fill::Zero(DataType::Float64) => Value::Float64(0.0),
                    Fill::Zero(_) => Value::Int64(0),
                    Fill::Text(text) => Value::Utf8(text.clone()),
                    Fill::Label { prefix, id } => {
                        let id = id
                            .map(|i| &row[i])
                            .filter(|v| !v.is_missing())
                            .map_or_else(|| row_number.to_string(), render_id);
                        Value::Utf8(format!("{prefix} {id}"))
                    }
                    Fill::Date => Value::Date(self.processing_date),
                    Fill::DateFrom(source) => Value::Date(
                        source
                            .and_then(|i| coerce_date(&row[i], self.date_format))
                            .unwrap_or(self.processing_date),
                    ),
                };
                counts[*idx] += 1;
            }
            for (idx, normalizer) in &normalizers {
                if let Some(value) = normalize(normalizer, &out[*idx]) {
                    out[*idx] = value;
                    changed[*idx] += 1;
                }
            }
            out
        });

        let by_column = |counts: Vec<usize>| -> BTreeMap<String, usize> {
            counts
                .into_iter()
                .enumerate()
                .filter(|(_, n)| *n > 0)
                .map(|(i, n)| (dataset.schema.fields[i].name.clone(), n))
                .collect()
        };
        let stats = ImputationStats {
            filled: by_column(counts),
            normalized: by_column(changed),
        };
        (imputed, stats)
    }
}

/// The normalized value, or `None` when `value` is already normal or missing.
fn normalize(normalizer: &Normalizer, value: &Value) -> Option<Value> {
    let out = match (normalizer, value) {
        (Normalizer::DigitsOnly, Value::Utf8(s)) => Value::Utf8(s.chars().filter(char::is_ascii_digit).collect()),
        (Normalizer::Flag, Value::Int64(v)) => Value::Int64(i64::from(*v > 0)),
        (Normalizer::Replace { from, to }, Value::Utf8(s)) if s.trim().eq_ignore_ascii_case(from) => {
            Value::Utf8(to.clone())
        }
        _ => return None,
    };
    (out != *value).then_some(out)
}

fn render_id(value: &Value) -> String {
    match value {
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Utf8(s) => s.trim().to_string(),
        Value::Date(d) => d.to_string(),
        Value::Null => String::new(),
    }
}
