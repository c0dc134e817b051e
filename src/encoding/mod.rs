//! Artifact encoding and size estimation.
//!
//! The [`SizeEstimator`] serializes a row selection to the exact bytes the artifact writer will
//! persist, so a measured size is the realized size of the artifact. All split decisions in
//! [`crate::partition`] are made on these measurements.

mod csv;
#[cfg(feature = "excel")]
mod xlsx;

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;
use crate::error::{ExportError, ExportResult};
use crate::types::{DataSet, Value};

/// Supported artifact encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// UTF-8 CSV with a byte-order mark and a header row.
    #[default]
    Csv,
    /// Excel workbook with a single sheet (feature-gated behind `excel`).
    Xlsx,
}

impl ArtifactFormat {
    /// File extension for artifacts in this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

/// Serializes row selections to the canonical artifact encoding.
#[derive(Debug, Clone)]
pub struct SizeEstimator {
    format: ArtifactFormat,
    date_format: String,
}

impl SizeEstimator {
    /// Create an estimator for `format`, writing dates with the `chrono` pattern `date_format`.
    pub fn new(format: ArtifactFormat, date_format: impl Into<String>) -> Self {
        Self {
            format,
            date_format: date_format.into(),
        }
    }

    /// Estimator matching the artifact writer configured in `config`.
    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.format, config.date_format.clone())
    }

    /// Artifact format produced by this estimator.
    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Encode the rows at `indices` (in that order), header included.
    pub fn encode(&self, dataset: &DataSet, indices: &[usize]) -> ExportResult<Vec<u8>> {
        let mut rows = Vec::with_capacity(indices.len());
        for &i in indices {
            let row = dataset.rows.get(i).ok_or_else(|| ExportError::Encode {
                message: format!("row index {i} out of bounds ({} rows)", dataset.row_count()),
            })?;
            rows.push(row.as_slice());
        }
        self.encode_rows(dataset, &rows)
    }

    /// Encode every row of `dataset`.
    pub fn encode_all(&self, dataset: &DataSet) -> ExportResult<Vec<u8>> {
        let rows: Vec<&[Value]> = dataset.rows.iter().map(Vec::as_slice).collect();
        self.encode_rows(dataset, &rows)
    }

    /// Byte length of the encoding of the rows at `indices`.
    pub fn estimate(&self, dataset: &DataSet, indices: &[usize]) -> ExportResult<u64> {
        Ok(self.encode(dataset, indices)?.len() as u64)
    }

    fn encode_rows(&self, dataset: &DataSet, rows: &[&[Value]]) -> ExportResult<Vec<u8>> {
        match self.format {
            ArtifactFormat::Csv => csv::encode_csv(&dataset.schema, rows, &self.date_format),
            ArtifactFormat::Xlsx => self.encode_xlsx(dataset, rows),
        }
    }

    #[cfg(feature = "excel")]
    fn encode_xlsx(&self, dataset: &DataSet, rows: &[&[Value]]) -> ExportResult<Vec<u8>> {
        xlsx::encode_xlsx(&dataset.schema, rows, &self.date_format)
    }

    #[cfg(not(feature = "excel"))]
    fn encode_xlsx(&self, dataset: &DataSet, rows: &[&[Value]]) -> ExportResult<Vec<u8>> {
        let _ = (dataset, rows);
        Err(ExportError::Encode {
            message: "xlsx artifacts not enabled (enable cargo feature 'excel')".to_string(),
        })
    }
}

/// Text rendering of a value shared by every encoding.
pub(crate) fn format_value(value: &Value, date_format: &str) -> ExportResult<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Utf8(s) => s.clone(),
        Value::Date(d) => {
            let mut out = String::with_capacity(10);
            write!(out, "{}", d.format(date_format)).map_err(|_| ExportError::Encode {
                message: format!("invalid date format '{date_format}'"),
            })?;
            out
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{format_value, ArtifactFormat, SizeEstimator};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn ledger() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("Id", DataType::Int64),
            Field::new("Data Emissao", DataType::Date),
            Field::new("Valor documento", DataType::Float64),
        ]);
        let d = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();
        DataSet::new(
            schema,
            vec![
                vec![Value::Int64(1), Value::Date(d), Value::Float64(10.5)],
                vec![Value::Int64(2), Value::Null, Value::Float64(0.0)],
            ],
        )
    }

    #[test]
    fn dates_are_written_day_first() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();
        assert_eq!(format_value(&Value::Date(d), "%d/%m/%Y").unwrap(), "05/03/2021");
        assert_eq!(format_value(&Value::Null, "%d/%m/%Y").unwrap(), "");
    }

    #[test]
    fn estimate_matches_encoded_length_and_is_deterministic() {
        let ds = ledger();
        let est = SizeEstimator::new(ArtifactFormat::Csv, "%d/%m/%Y");
        let bytes = est.encode(&ds, &[0, 1]).unwrap();
        assert_eq!(est.estimate(&ds, &[0, 1]).unwrap(), bytes.len() as u64);
        assert_eq!(est.encode(&ds, &[0, 1]).unwrap(), bytes);
        assert_eq!(est.encode_all(&ds).unwrap(), bytes);
    }

    #[test]
    fn out_of_bounds_index_is_an_encode_error() {
        let ds = ledger();
        let est = SizeEstimator::new(ArtifactFormat::Csv, "%d/%m/%Y");
        let err = est.estimate(&ds, &[7]).unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }

    #[cfg(not(feature = "excel"))]
    #[test]
    fn xlsx_requires_feature() {
        let est = SizeEstimator::new(ArtifactFormat::Xlsx, "%d/%m/%Y");
        assert!(est.estimate(&ledger(), &[0]).is_err());
    }
}
