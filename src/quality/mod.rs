//! Data quality scanning.
//!
//! [`QualityScanner`] runs a profile's declared checks over a dataset and returns one
//! [`AnomalyReport`] per failing (check, column) pair. Scanning never changes the dataset;
//! missing values are filled afterwards by [`impute::Imputer`].

pub mod impute;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::catalog::{DatasetProfile, QualityCheck};
use crate::types::{coerce_date, DataSet, Value};

pub use impute::{ImputationStats, Imputer};

/// What an anomaly report flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Missing value in a required column.
    NullInRequiredColumn,
    /// A date that precedes the date it must follow.
    ChronologicalInconsistency,
    /// Zero or negative value in an amount column.
    NonPositiveAmount,
    /// Identifier with an unexpected number of digits.
    MalformedIdentifier,
    /// Date outside the configured bounds; these rows are excluded from date buckets.
    OutOfRangeDate,
}

impl AnomalyKind {
    /// Short name used in artifact file names.
    pub fn slug(self) -> &'static str {
        match self {
            AnomalyKind::NullInRequiredColumn => "null",
            AnomalyKind::ChronologicalInconsistency => "chronology",
            AnomalyKind::NonPositiveAmount => "non_positive",
            AnomalyKind::MalformedIdentifier => "malformed_id",
            AnomalyKind::OutOfRangeDate => "out_of_range_date",
        }
    }
}

/// Rows failing one check on one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyReport {
    /// Failing check.
    pub kind: AnomalyKind,
    /// Column the check flagged (the later date for chronology checks).
    pub column: String,
    /// Offending row indices, ascending.
    pub rows: Vec<usize>,
}

impl AnomalyReport {
    /// Number of offending rows.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Artifact label, e.g. `anomaly_null_Valor documento`.
    pub fn label(&self) -> String {
        format!("anomaly_{}_{}", self.kind.slug(), self.column)
    }
}

/// Result of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualitySummary {
    /// Non-empty reports, in check order.
    pub reports: Vec<AnomalyReport>,
}

impl QualitySummary {
    /// Number of distinct rows flagged by at least one check.
    pub fn flagged_rows(&self) -> usize {
        self.reports
            .iter()
            .flat_map(|r| r.rows.iter().copied())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Total offending rows for one kind of check.
    pub fn count_of(&self, kind: AnomalyKind) -> usize {
        self.reports.iter().filter(|r| r.kind == kind).map(AnomalyReport::count).sum()
    }
}

/// Runs a profile's checks over datasets shaped by its schema.
#[derive(Debug, Clone, Copy)]
pub struct QualityScanner<'a> {
    profile: &'a DatasetProfile,
    date_format: &'a str,
}

impl<'a> QualityScanner<'a> {
    /// Scanner for `profile`; `date_format` is used for date cells still held as text.
    pub fn new(profile: &'a DatasetProfile, date_format: &'a str) -> Self {
        Self { profile, date_format }
    }

    /// Run the required-column null check followed by every declared check.
    pub fn scan(&self, dataset: &DataSet) -> QualitySummary {
        let mut reports = Vec::new();

        for column in self.profile.required_columns() {
            if let Some(idx) = dataset.schema.index_of(column) {
                let rows = matching_rows(dataset, |row| row.get(idx).is_none_or(Value::is_missing));
                push_report(&mut reports, AnomalyKind::NullInRequiredColumn, column, rows);
            }
        }

        for check in &self.profile.checks {
            let Some(cols) = check
                .columns()
                .iter()
                .map(|c| dataset.schema.index_of(c))
                .collect::<Option<Vec<usize>>>()
            else {
                debug!(dataset = %self.profile.name, ?check, "check skipped: column not in schema");
                continue;
            };

            match check {
                QualityCheck::Chronology { later, .. } => {
                    let (earlier_idx, later_idx) = (cols[0], cols[1]);
                    let rows = matching_rows(dataset, |row| {
                        let date = |idx: usize| row.get(idx).and_then(|v| coerce_date(v, self.date_format));
                        match (date(earlier_idx), date(later_idx)) {
                            (Some(earlier), Some(later)) => later < earlier,
                            _ => false,
                        }
                    });
                    push_report(&mut reports, AnomalyKind::ChronologicalInconsistency, later, rows);
                }
                QualityCheck::PositiveAmount { column } => {
                    let idx = cols[0];
                    let rows = matching_rows(dataset, |row| matches!(row.get(idx).and_then(Value::as_f64), Some(v) if v <= 0.0));
                    push_report(&mut reports, AnomalyKind::NonPositiveAmount, column, rows);
                }
                QualityCheck::IdentifierLength {
                    column,
                    allowed_lengths,
                } => {
                    let idx = cols[0];
                    let rows = matching_rows(dataset, |row| {
                        row.get(idx)
                            .and_then(identifier_digits)
                            .is_some_and(|d| !allowed_lengths.contains(&d.len()))
                    });
                    push_report(&mut reports, AnomalyKind::MalformedIdentifier, column, rows);
                }
            }
        }

        for r in &reports {
            debug!(dataset = %self.profile.name, check = r.kind.slug(), column = %r.column, rows = r.count(), "anomalies found");
        }
        QualitySummary { reports }
    }
}

/// Report for rows the date planner diverted.
pub fn out_of_range_report(column: &str, rows: Vec<usize>) -> AnomalyReport {
    AnomalyReport {
        kind: AnomalyKind::OutOfRangeDate,
        column: column.to_string(),
        rows,
    }
}

/// Digits of a present identifier value; `None` when the value is missing.
pub fn identifier_digits(value: &Value) -> Option<String> {
    match value {
        Value::Utf8(s) if !s.trim().is_empty() => Some(s.chars().filter(char::is_ascii_digit).collect()),
        Value::Int64(v) => Some(v.unsigned_abs().to_string()),
        _ => None,
    }
}

fn matching_rows(dataset: &DataSet, pred: impl Fn(&[Value]) -> bool) -> Vec<usize> {
    dataset
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| pred(row))
        .map(|(i, _)| i)
        .collect()
}

fn push_report(reports: &mut Vec<AnomalyReport>, kind: AnomalyKind, column: &str, rows: Vec<usize>) {
    if !rows.is_empty() {
        reports.push(AnomalyReport {
            kind,
            column: column.to_string(),
            rows,
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{identifier_digits, AnomalyKind, QualityScanner};
    use crate::catalog::Catalog;
    use crate::types::{DataSet, Value};

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    /// Payables shaped by the built-in profile; columns not set here are null.
    fn payables(rows: Vec<[(usize, Value); 4]>) -> DataSet {
        let profile = Catalog::builtin().get("accounts_payable").unwrap().clone();
        let schema = profile.schema();
        let width = schema.fields.len();
        let rows = rows
            .into_iter()
            .map(|cells| {
                let mut row = vec![Value::Null; width];
                for (idx, v) in cells {
                    row[idx] = v;
                }
                row
            })
            .collect();
        DataSet::new(schema, rows)
    }

    #[test]
    fn flags_nulls_chronology_and_amounts_without_mutating() {
        let catalog = Catalog::builtin();
        let profile = catalog.get("accounts_payable").unwrap();
        // 0 Id, 2 Data Emissao, 3 Data vencimento, 5 Valor documento
        let ds = payables(vec![
            [(0, Value::Int64(1)), (2, date(2021, 3, 5)), (3, date(2021, 4, 5)), (5, Value::Float64(10.0))],
            [(0, Value::Int64(2)), (2, date(2021, 3, 5)), (3, date(2021, 2, 1)), (5, Value::Null)],
            [(0, Value::Int64(3)), (2, date(2021, 3, 5)), (3, date(2021, 3, 5)), (5, Value::Float64(-4.0))],
        ]);
        let before = ds.clone();

        let summary = QualityScanner::new(profile, "%d/%m/%Y").scan(&ds);
        assert_eq!(ds, before);

        let null_valor = summary
            .reports
            .iter()
            .find(|r| r.kind == AnomalyKind::NullInRequiredColumn && r.column == "Valor documento")
            .unwrap();
        assert_eq!(null_valor.rows, vec![1]);
        assert_eq!(null_valor.label(), "anomaly_null_Valor documento");

        let chronology = summary
            .reports
            .iter()
            .find(|r| r.kind == AnomalyKind::ChronologicalInconsistency)
            .unwrap();
        assert_eq!((chronology.column.as_str(), chronology.rows.clone()), ("Data vencimento", vec![1]));

        assert_eq!(summary.count_of(AnomalyKind::NonPositiveAmount), 1);
        // Fornecedor is required and null on every row.
        assert_eq!(summary.flagged_rows(), 3);
    }

    #[test]
    fn identifiers_are_checked_on_digits_only() {
        assert_eq!(identifier_digits(&Value::Utf8("123.456.789-09".into())).unwrap().len(), 11);
        assert_eq!(identifier_digits(&Value::Utf8("  ".into())), None);
        assert_eq!(identifier_digits(&Value::Null), None);

        let catalog = Catalog::builtin();
        let profile = catalog.get("contacts").unwrap();
        let schema = profile.schema();
        let cpf = schema.index_of("CNPJ / CPF").unwrap();
        let mut ok = vec![Value::Null; schema.fields.len()];
        ok[0] = Value::Int64(1);
        ok[2] = Value::Utf8("Ana".into());
        ok[cpf] = Value::Utf8("12.345.678/0001-95".into());
        let mut bad = ok.clone();
        bad[0] = Value::Int64(2);
        bad[cpf] = Value::Utf8("1234".into());
        let ds = DataSet::new(schema, vec![ok, bad]);

        let summary = QualityScanner::new(profile, "%d/%m/%Y").scan(&ds);
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].kind, AnomalyKind::MalformedIdentifier);
        assert_eq!(summary.reports[0].rows, vec![1]);
    }
}
