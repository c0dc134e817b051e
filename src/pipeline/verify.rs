//! Split integrity verification.
//!
//! Re-reads the artifacts of one dataset type from the output directory and checks that the
//! chunks, together with the out-of-range anomaly artifact, hold exactly the rows of the complete
//! artifact: same row count, same identifiers (none missing, extra or repeated) and the same
//! monetary totals.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::DatasetProfile;
use crate::config::ExportConfig;
use crate::encoding::format_value;
use crate::error::{ExportError, ExportResult};
use crate::ingestion::{load_dataset, LoadOptions};
use crate::pipeline::artifacts::{artifact_label, existing_artifacts};
use crate::processing::{column_total, reduce, ReduceOp};
use crate::quality::AnomalyKind;
use crate::types::{DataSet, Value};

/// Largest absolute difference tolerated between monetary totals.
pub const SUM_TOLERANCE: f64 = 0.01;

/// Totals of one monetary column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SumCheck {
    pub column: String,
    pub complete: f64,
    pub parts: f64,
}

impl SumCheck {
    pub fn matches(&self) -> bool {
        (self.complete - self.parts).abs() <= SUM_TOLERANCE
    }
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// Dataset type name.
    pub dataset: String,
    /// The complete artifact that was read.
    pub complete: PathBuf,
    /// Whether any chunk or out-of-range artifact exists.
    pub split: bool,
    /// Chunk artifacts read, sorted by path.
    pub chunks: Vec<PathBuf>,
    /// Rows in the complete artifact.
    pub complete_rows: usize,
    /// Rows across chunks.
    pub chunk_rows: usize,
    /// Rows in the out-of-range anomaly artifact.
    pub diverted_rows: usize,
    /// Identifiers present in the complete artifact but not in any part.
    pub missing_ids: Vec<String>,
    /// Identifiers present in parts but not in the complete artifact.
    pub extra_ids: Vec<String>,
    /// Identifiers held by parts more often than by the complete artifact.
    pub duplicated_ids: Vec<String>,
    /// One entry per monetary column.
    pub sums: Vec<SumCheck>,
    /// Earliest and latest partition date in the complete artifact.
    pub date_range: Option<(Value, Value)>,
}

impl IntegrityReport {
    /// Whether every check passed.
    pub fn is_ok(&self) -> bool {
        if !self.split {
            return true;
        }
        self.complete_rows == self.chunk_rows + self.diverted_rows
            && self.missing_ids.is_empty()
            && self.extra_ids.is_empty()
            && self.duplicated_ids.is_empty()
            && self.sums.iter().all(SumCheck::matches)
    }
}

/// Verify the artifacts of `profile` found in `config.output_dir`.
///
/// A dataset that was never split (complete artifact only) verifies trivially. A missing complete
/// artifact is reported as [`ExportError::MissingInput`].
pub fn verify(config: &ExportConfig, profile: &DatasetProfile) -> ExportResult<IntegrityReport> {
    let dir = config.output_dir.as_path();
    let schema = profile.schema();
    let options = LoadOptions::with_date_format(config.date_format.clone());
    let out_of_range = format!("anomaly_{}_", AnomalyKind::OutOfRangeDate.slug());

    let mut complete_path = None;
    let mut chunk_paths = Vec::new();
    let mut diverted_paths = Vec::new();
    for path in existing_artifacts(dir, &profile.name, config.format)? {
        let label = artifact_label(&path, &profile.name, config.format);
        match label.as_deref() {
            Some("complete") => complete_path = Some(path),
            Some(label) if label.starts_with(&out_of_range) => diverted_paths.push(path),
            Some(label) if label.starts_with("anomaly_") => {}
            Some(_) => chunk_paths.push(path),
            None => {}
        }
    }
    let complete_path = complete_path.ok_or_else(|| ExportError::MissingInput {
        path: dir.join(format!("{}_complete.{}", profile.name, config.format.extension())),
    })?;

    let complete = load_dataset(&complete_path, &schema, &options)?;
    let chunks = load_all(&chunk_paths, &schema, &options)?;
    let diverted = load_all(&diverted_paths, &schema, &options)?;
    let chunk_rows = chunks.iter().map(DataSet::row_count).sum();
    let diverted_rows = diverted.iter().map(DataSet::row_count).sum();

    let mut report = IntegrityReport {
        dataset: profile.name.clone(),
        complete: complete_path,
        split: !chunk_paths.is_empty() || !diverted_paths.is_empty(),
        chunks: chunk_paths,
        complete_rows: complete.row_count(),
        chunk_rows,
        diverted_rows,
        missing_ids: Vec::new(),
        extra_ids: Vec::new(),
        duplicated_ids: Vec::new(),
        sums: Vec::new(),
        date_range: None,
    };

    // Nothing to compare when the dataset was not split.
    if !report.split {
        info!(dataset = %profile.name, rows = report.complete_rows, "dataset not split; nothing to verify");
        return Ok(report);
    }

    let parts: Vec<&DataSet> = chunks.iter().chain(diverted.iter()).collect();

    if let Some(id) = profile.id_column.as_deref() {
        let expected = id_counts(&complete, id, &config.date_format)?;
        let mut found = BTreeMap::new();
        for part in &parts {
            for (key, n) in id_counts(part, id, &config.date_format)? {
                *found.entry(key).or_insert(0usize) += n;
            }
        }
        for (key, &n) in &expected {
            match found.get(key) {
                None => report.missing_ids.push(key.clone()),
                Some(&m) if m > n => report.duplicated_ids.push(key.clone()),
                Some(&m) if m < n => report.missing_ids.push(key.clone()),
                Some(_) => {}
            }
        }
        report.extra_ids = found.keys().filter(|k| !expected.contains_key(*k)).cloned().collect();
    }

    report.sums = profile
        .monetary_columns
        .iter()
        .map(|column| SumCheck {
            column: column.clone(),
            complete: column_total(&complete, column),
            parts: parts.iter().map(|p| column_total(p, column)).sum(),
        })
        .collect();

    if let Some(column) = profile.partition_date_column.as_deref() {
        let min = reduce(&complete, column, ReduceOp::Min);
        let max = reduce(&complete, column, ReduceOp::Max);
        report.date_range = min.zip(max).filter(|(lo, _)| !lo.is_missing());
    }

    if report.is_ok() {
        info!(dataset = %profile.name, chunks = report.chunks.len(), rows = report.complete_rows, "split verified");
    } else {
        warn!(
            dataset = %profile.name,
            complete_rows = report.complete_rows,
            chunk_rows = report.chunk_rows,
            diverted_rows = report.diverted_rows,
            missing = report.missing_ids.len(),
            extra = report.extra_ids.len(),
            duplicated = report.duplicated_ids.len(),
            "split verification failed"
        );
    }
    Ok(report)
}

fn load_all(paths: &[PathBuf], schema: &crate::types::Schema, options: &LoadOptions) -> ExportResult<Vec<DataSet>> {
    paths.iter().map(|p| load_dataset(p, schema, options)).collect()
}

/// Occurrences of each present identifier.
fn id_counts(dataset: &DataSet, column: &str, date_format: &str) -> ExportResult<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    let Some(idx) = dataset.schema.index_of(column) else {
        return Ok(counts);
    };
    for row in &dataset.rows {
        let Some(value) = row.get(idx).filter(|v| !v.is_missing()) else {
            continue;
        };
        *counts.entry(format_value(value, date_format)?).or_insert(0) += 1;
    }
    Ok(counts)
}
