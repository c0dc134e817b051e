//! Per-dataset export pipeline.
//!
//! [`Orchestrator::run`] drives one dataset through
//! `Loaded → Scanned → Imputed → CompletePersisted → SplitDecided → Split → Verified → Done`:
//!
//! 1. load the input against the profile schema
//! 2. scan for anomalies and write one anomaly artifact per failing check (rows as loaded)
//! 3. impute missing values
//! 4. persist and measure the complete artifact; stop when it fits the ceiling
//! 5. partition by the profile's date column when present, else by row count
//! 6. write every chunk, then re-measure each written chunk on disk and re-split any that is
//!    still above the ceiling; the parts are renumbered alongside their siblings
//! 7. check that chunks and diverted rows account for every row exactly once
//!
//! A missing input or an empty dataset ends that dataset's pipeline only.

pub mod artifacts;
pub mod verify;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::DatasetProfile;
use crate::config::ExportConfig;
use crate::encoding::SizeEstimator;
use crate::error::{ExportError, ExportResult, Severity};
use crate::ingestion::{load_dataset, LoadOptions};
use crate::observability::{PipelineContext, PipelineObserver};
use crate::partition::{part_label, Chunk, ChunkFit, DateBucketPlanner, Granularity, RowSplitter};
use crate::quality::{out_of_range_report, AnomalyReport, ImputationStats, Imputer, QualityScanner, QualitySummary};
use crate::types::{DataSet, Schema, Value};

pub use artifacts::{Artifact, ArtifactKind, ArtifactSink};
pub use verify::{verify, IntegrityReport};

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Loaded,
    Scanned,
    Imputed,
    CompletePersisted,
    SplitDecided,
    Split,
    Verified,
    Done,
}

/// Where a dataset comes from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// A CSV or workbook file exported by the extraction step.
    Path(PathBuf),
    /// Rows already in memory. Columns are matched to the profile by name or alias.
    InMemory(DataSet),
}

/// Why a dataset produced no artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The dataset has no rows.
    Empty,
}

/// How a dataset was split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// The complete artifact fits the ceiling.
    NotNeeded,
    /// Date buckets at the selected granularity.
    Date {
        column: String,
        granularity: Granularity,
        levels_tried: usize,
    },
    /// Row-count chunks.
    RowCount,
}

/// Outcome of one dataset's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetReport {
    /// Dataset type name.
    pub dataset: String,
    /// Last stage reached.
    pub final_stage: PipelineStage,
    /// Set when the pipeline stopped early without error.
    pub skipped: Option<SkipReason>,
    /// Loaded rows.
    pub rows: usize,
    /// Split decision; `None` when skipped.
    pub split: Option<SplitStrategy>,
    /// Anomalies found before imputation.
    pub anomalies: QualitySummary,
    /// Cells filled by imputation.
    pub imputed: ImputationStats,
    /// Rows excluded from date buckets for out-of-range dates.
    pub diverted_rows: usize,
    /// Chunks replaced by the on-disk size sweep.
    pub resplit_chunks: usize,
    /// Every artifact written, complete first.
    pub artifacts: Vec<Artifact>,
}

impl DatasetReport {
    fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            final_stage: PipelineStage::Loaded,
            skipped: None,
            rows: 0,
            split: None,
            anomalies: QualitySummary::default(),
            imputed: ImputationStats::default(),
            diverted_rows: 0,
            resplit_chunks: 0,
            artifacts: Vec::new(),
        }
    }

    /// Artifacts of one kind.
    pub fn artifacts_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    /// The complete artifact, when written.
    pub fn complete(&self) -> Option<&Artifact> {
        self.artifacts_of(ArtifactKind::Complete).next()
    }
}

/// Options shared by every pipeline run.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Optional observer for stage, artifact and failure events.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
    /// Workbook sheet read for `.xlsx` inputs; `None` reads the first sheet.
    pub sheet: Option<String>,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("sheet", &self.sheet)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: Severity::Critical,
            sheet: None,
        }
    }
}

/// A chunk artifact together with the dataset rows it holds.
struct WrittenChunk {
    artifact: Artifact,
    rows: Vec<usize>,
}

/// Runs datasets through the export pipeline.
///
/// ```no_run
/// use bounded_export::catalog::Catalog;
/// use bounded_export::config::ExportConfig;
/// use bounded_export::pipeline::{DatasetSource, Orchestrator};
///
/// # fn main() -> Result<(), bounded_export::ExportError> {
/// let config = ExportConfig::default().with_ceiling(500 * 1024);
/// let catalog = Catalog::builtin();
/// let profile = catalog.get("accounts_payable").expect("built-in profile");
/// let report = Orchestrator::new(&config).run(
///     profile,
///     DatasetSource::Path("exported_data/contas_a_pagar.csv".into()),
/// )?;
/// println!("{} artifacts", report.artifacts.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Orchestrator<'a> {
    config: &'a ExportConfig,
    options: PipelineOptions,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator with default options.
    pub fn new(config: &'a ExportConfig) -> Self {
        Self {
            config,
            options: PipelineOptions::default(),
        }
    }

    /// Replace the pipeline options.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach an observer.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.options.observer = Some(observer);
        self
    }

    /// Run one dataset through the pipeline.
    ///
    /// Failures are reported to the observer (and alerted at or above the threshold) before
    /// being returned.
    pub fn run(&self, profile: &DatasetProfile, source: DatasetSource) -> ExportResult<DatasetReport> {
        let ctx = PipelineContext {
            dataset: profile.name.clone(),
        };
        let result = self.run_inner(&ctx, profile, source);
        if let Err(err) = &result {
            let severity = err.severity();
            warn!(dataset = %ctx.dataset, ?severity, error = %err, "dataset pipeline failed");
            if let Some(obs) = &self.options.observer {
                obs.on_failure(&ctx, severity, err);
                if severity >= self.options.alert_at_or_above {
                    obs.on_alert(&ctx, severity, err);
                }
            }
        }
        result
    }

    fn run_inner(
        &self,
        ctx: &PipelineContext,
        profile: &DatasetProfile,
        source: DatasetSource,
    ) -> ExportResult<DatasetReport> {
        let config = self.config;
        config.validate()?;
        profile.validate()?;
        let schema = profile.schema();
        let mut report = DatasetReport::new(&profile.name);

        let raw = match source {
            DatasetSource::Path(path) => {
                let options = LoadOptions {
                    format: None,
                    sheet: self.options.sheet.clone(),
                    date_format: config.date_format.clone(),
                };
                load_dataset(&path, &schema, &options)?
            }
            DatasetSource::InMemory(ds) => conform(ds, &schema)?,
        };
        report.rows = raw.row_count();
        self.stage(ctx, &mut report, PipelineStage::Loaded);

        if raw.is_empty() {
            self.warning(ctx, Severity::Info, "dataset is empty; no artifacts written");
            report.skipped = Some(SkipReason::Empty);
            return Ok(report);
        }

        let estimator = SizeEstimator::from_config(config);
        let sink = ArtifactSink::new(&config.output_dir, &profile.name, config.format)?;
        sink.clear_previous()?;

        report.anomalies = QualityScanner::new(profile, &config.date_format).scan(&raw);
        for anomaly in &report.anomalies.reports {
            let artifact = self.write_anomaly(ctx, &sink, &estimator, &raw, anomaly)?;
            report.artifacts.push(artifact);
        }
        info!(
            dataset = %profile.name,
            checks = report.anomalies.reports.len(),
            flagged_rows = report.anomalies.flagged_rows(),
            "quality scan finished"
        );
        self.stage(ctx, &mut report, PipelineStage::Scanned);

        let (data, stats) = Imputer::new(profile, config.processing_date(), &config.date_format).impute(&raw);
        info!(
            dataset = %profile.name,
            filled = stats.total_filled(),
            normalized = stats.total_normalized(),
            "imputation finished"
        );
        report.imputed = stats;
        drop(raw);
        self.stage(ctx, &mut report, PipelineStage::Imputed);

        let (path, bytes) = sink.write("complete", &estimator.encode_all(&data)?)?;
        let complete = Artifact {
            kind: ArtifactKind::Complete,
            path,
            label: "complete".to_string(),
            rows: data.row_count(),
            bytes,
            fit: None,
            window: None,
        };
        self.emit_artifact(ctx, &complete);
        report.artifacts.insert(0, complete);
        self.stage(ctx, &mut report, PipelineStage::CompletePersisted);

        if bytes <= config.ceiling_bytes {
            info!(dataset = %profile.name, bytes, ceiling = config.ceiling_bytes, "complete artifact fits; no split");
            report.split = Some(SplitStrategy::NotNeeded);
            self.stage(ctx, &mut report, PipelineStage::Done);
            return Ok(report);
        }

        let splitter = RowSplitter::from_config(&estimator, config);
        let date_column = profile
            .partition_date_column
            .as_deref()
            .filter(|c| data.schema.index_of(c).is_some());
        let (chunks, diverted) = match date_column {
            Some(column) => {
                let plan = DateBucketPlanner::from_config(&estimator, config).plan(&data, column)?;
                report.split = Some(match plan.granularity {
                    Granularity::RowCount => SplitStrategy::RowCount,
                    granularity => SplitStrategy::Date {
                        column: column.to_string(),
                        granularity,
                        levels_tried: plan.attempts.len(),
                    },
                });
                if !plan.diverted.is_empty() {
                    let anomaly = out_of_range_report(column, plan.diverted.clone());
                    let artifact = self.write_anomaly(ctx, &sink, &estimator, &data, &anomaly)?;
                    report.artifacts.push(artifact);
                    report.anomalies.reports.push(anomaly);
                }
                (plan.buckets, plan.diverted)
            }
            None => {
                report.split = Some(SplitStrategy::RowCount);
                let all: Vec<usize> = (0..data.row_count()).collect();
                (splitter.split(&data, &all), Vec::new())
            }
        };
        report.diverted_rows = diverted.len();
        info!(dataset = %profile.name, chunks = chunks.len(), diverted = diverted.len(), split = ?report.split, "split decided");
        self.stage(ctx, &mut report, PipelineStage::SplitDecided);

        let mut written = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            written.push(self.write_chunk(ctx, &sink, &estimator, &data, chunk)?);
        }
        self.stage(ctx, &mut report, PipelineStage::Split);

        let (written, resplit) = self.sweep(ctx, &sink, &estimator, &splitter, &data, written)?;
        report.resplit_chunks = resplit;
        check_completeness(data.row_count(), &written, &diverted)?;
        report.artifacts.extend(written.into_iter().map(|w| w.artifact));
        self.stage(ctx, &mut report, PipelineStage::Verified);

        self.stage(ctx, &mut report, PipelineStage::Done);
        Ok(report)
    }

    fn write_anomaly(
        &self,
        ctx: &PipelineContext,
        sink: &ArtifactSink,
        estimator: &SizeEstimator,
        data: &DataSet,
        anomaly: &AnomalyReport,
    ) -> ExportResult<Artifact> {
        let label = anomaly.label();
        let (path, bytes) = sink.write(&label, &estimator.encode(data, &anomaly.rows)?)?;
        let artifact = Artifact {
            kind: ArtifactKind::Anomaly,
            path,
            label,
            rows: anomaly.count(),
            bytes,
            fit: None,
            window: None,
        };
        self.emit_artifact(ctx, &artifact);
        Ok(artifact)
    }

    fn write_chunk(
        &self,
        ctx: &PipelineContext,
        sink: &ArtifactSink,
        estimator: &SizeEstimator,
        data: &DataSet,
        chunk: Chunk,
    ) -> ExportResult<WrittenChunk> {
        match chunk.fit {
            ChunkFit::OversizedLeaf => self.warning(
                ctx,
                Severity::Warning,
                &format!("chunk '{}' is a single row above the ceiling", chunk.label),
            ),
            ChunkFit::Unmeasured => self.warning(
                ctx,
                Severity::Warning,
                &format!("chunk '{}' could not be measured before writing", chunk.label),
            ),
            ChunkFit::Within => {}
        }
        let (path, bytes) = sink.write(&chunk.label, &estimator.encode(data, &chunk.rows)?)?;
        let artifact = Artifact {
            kind: ArtifactKind::Chunk,
            path,
            label: chunk.label,
            rows: chunk.rows.len(),
            bytes,
            fit: Some(chunk.fit),
            window: chunk.window,
        };
        self.emit_artifact(ctx, &artifact);
        Ok(WrittenChunk {
            artifact,
            rows: chunk.rows,
        })
    }

    /// Re-measure every written chunk on disk and replace any multi-row chunk above the ceiling
    /// by smaller parts. Returns the final chunks and the number replaced.
    ///
    /// Parts are first written under labels nested in the replaced chunk's label, then every
    /// chunk of an affected group is renumbered, so `part_002` split in two yields `part_002` and
    /// `part_003` and pushes the old `part_003` to `part_004`.
    fn sweep(
        &self,
        ctx: &PipelineContext,
        sink: &ArtifactSink,
        estimator: &SizeEstimator,
        splitter: &RowSplitter<'_>,
        data: &DataSet,
        written: Vec<WrittenChunk>,
    ) -> ExportResult<(Vec<WrittenChunk>, usize)> {
        let ceiling = self.config.ceiling_bytes;
        let mut done = Vec::with_capacity(written.len());
        let mut pending: Vec<WrittenChunk> = written.into_iter().rev().collect();
        let mut replaced = 0usize;
        let mut regrouped = BTreeSet::new();

        while let Some(mut chunk) = pending.pop() {
            let realized = realized_size(&chunk.artifact.path)?;
            chunk.artifact.bytes = realized;
            if realized <= ceiling || chunk.rows.len() <= 1 {
                if realized > ceiling {
                    chunk.artifact.fit = Some(ChunkFit::OversizedLeaf);
                }
                done.push(chunk);
                continue;
            }

            debug!(label = %chunk.artifact.label, realized, ceiling, "written chunk above ceiling; re-splitting");
            sink.remove(&chunk.artifact.path)?;
            replaced += 1;
            let label = chunk.artifact.label.clone();
            regrouped.insert(part_group(&label).map(str::to_owned));
            let window = chunk.artifact.window;
            let mut parts = splitter.split_labeled(data, &chunk.rows, Some(&label), window);
            if parts.len() < 2 {
                // The estimate disagrees with the realized size; halve instead.
                let (left, right) = chunk.rows.split_at(chunk.rows.len() / 2);
                parts = [left, right]
                    .into_iter()
                    .enumerate()
                    .map(|(i, rows)| Chunk {
                        label: part_label(Some(&label), i, 2),
                        window,
                        rows: rows.to_vec(),
                        size_bytes: None,
                        fit: ChunkFit::Unmeasured,
                    })
                    .collect();
            }
            let mut fresh = Vec::with_capacity(parts.len());
            for part in parts {
                fresh.push(self.write_chunk(ctx, sink, estimator, data, part)?);
            }
            // Parts are checked again, in order, before anything after them.
            pending.extend(fresh.into_iter().rev());
        }
        self.renumber(ctx, sink, &mut done, &regrouped)?;
        Ok((done, replaced))
    }

    /// Give the chunks of each group in `groups` consecutive part labels, in chunk order.
    fn renumber(
        &self,
        ctx: &PipelineContext,
        sink: &ArtifactSink,
        chunks: &mut [WrittenChunk],
        groups: &BTreeSet<Option<String>>,
    ) -> ExportResult<()> {
        let mut moves = Vec::new();
        let mut targets = Vec::new();
        for group in groups {
            let members: Vec<usize> = (0..chunks.len())
                .filter(|&i| part_group(&chunks[i].artifact.label) == group.as_deref())
                .collect();
            for (n, &i) in members.iter().enumerate() {
                let label = part_label(group.as_deref(), n, members.len());
                if chunks[i].artifact.label != label {
                    moves.push((chunks[i].artifact.path.clone(), label));
                    targets.push(i);
                }
            }
        }
        if moves.is_empty() {
            return Ok(());
        }
        let paths = sink.relabel(&moves)?;
        debug!(dataset = %ctx.dataset, renamed = paths.len(), "re-split chunks renumbered");
        for ((i, (_, label)), path) in targets.into_iter().zip(moves).zip(paths) {
            let artifact = &mut chunks[i].artifact;
            artifact.label = label;
            artifact.path = path;
        }
        Ok(())
    }

    fn stage(&self, ctx: &PipelineContext, report: &mut DatasetReport, stage: PipelineStage) {
        report.final_stage = stage;
        debug!(dataset = %ctx.dataset, ?stage, "stage reached");
        if let Some(obs) = &self.options.observer {
            obs.on_stage(ctx, stage);
        }
    }

    fn emit_artifact(&self, ctx: &PipelineContext, artifact: &Artifact) {
        if let Some(obs) = &self.options.observer {
            obs.on_artifact(ctx, artifact);
        }
    }

    fn warning(&self, ctx: &PipelineContext, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!(dataset = %ctx.dataset, "{message}"),
            _ => warn!(dataset = %ctx.dataset, ?severity, "{message}"),
        }
        if let Some(obs) = &self.options.observer {
            obs.on_warning(ctx, severity, message);
        }
    }
}

/// Write a JSON manifest of `reports` as `manifest.json` in `dir`.
pub fn write_manifest(dir: impl AsRef<Path>, reports: &[DatasetReport]) -> ExportResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join("manifest.json");
    let json = serde_json::to_vec_pretty(reports)?;
    artifacts::write_atomic(&path, &json)?;
    Ok(path)
}

fn realized_size(path: &Path) -> ExportResult<u64> {
    Ok(fs::metadata(path)?.len())
}

/// Label prefix shared by sibling parts: `2021-03` for `2021-03_part_002_part_001`, `None` for
/// `part_001` and its nested parts.
fn part_group(label: &str) -> Option<&str> {
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let mut base = label;
    while let Some((head, number)) = base.rsplit_once("_part_") {
        if !is_number(number) {
            break;
        }
        base = head;
    }
    match base.strip_prefix("part_") {
        Some(number) if is_number(number) => None,
        _ => Some(base),
    }
}

/// Reorder an in-memory dataset's columns to `schema`, filling absent columns with nulls.
///
/// Every row must have one value per declared column.
fn conform(ds: DataSet, schema: &Schema) -> ExportResult<DataSet> {
    let width = ds.schema.fields.len();
    if let Some((i, row)) = ds.rows.iter().enumerate().find(|(_, row)| row.len() != width) {
        return Err(ExportError::SchemaMismatch {
            message: format!("row {} has {} values for {width} columns", i + 1, row.len()),
        });
    }
    if ds.schema.field_names().eq(schema.field_names()) {
        return Ok(DataSet::new(schema.clone(), ds.rows));
    }
    let projection: Vec<Option<usize>> = schema
        .fields
        .iter()
        .map(|f| ds.schema.fields.iter().position(|src| f.matches_header(&src.name)))
        .collect();
    let rows = ds
        .rows
        .into_iter()
        .map(|row| {
            projection
                .iter()
                .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok(DataSet::new(schema.clone(), rows))
}

/// Chunks and diverted rows must cover `0..total` exactly once.
fn check_completeness(total: usize, chunks: &[WrittenChunk], diverted: &[usize]) -> ExportResult<()> {
    let mut seen = vec![0u32; total];
    let indices = chunks.iter().flat_map(|c| c.rows.iter()).chain(diverted.iter());
    for &i in indices {
        match seen.get_mut(i) {
            Some(n) => *n += 1,
            None => {
                return Err(ExportError::Integrity {
                    message: format!("row index {i} out of range ({total} rows)"),
                });
            }
        }
    }
    let missing = seen.iter().filter(|&&n| n == 0).count();
    let repeated = seen.iter().filter(|&&n| n > 1).count();
    if missing > 0 || repeated > 0 {
        return Err(ExportError::Integrity {
            message: format!("{missing} rows missing and {repeated} rows repeated across chunks"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    use super::{check_completeness, conform, part_group, Orchestrator, WrittenChunk};
    use crate::config::ExportConfig;
    use crate::encoding::{ArtifactFormat, SizeEstimator};
    use crate::error::ExportError;
    use crate::observability::PipelineContext;
    use crate::partition::{part_label, Chunk, ChunkFit, RowSplitter};
    use crate::pipeline::{Artifact, ArtifactKind, ArtifactSink};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn written(rows: Vec<usize>) -> WrittenChunk {
        WrittenChunk {
            artifact: Artifact {
                kind: ArtifactKind::Chunk,
                path: "x.csv".into(),
                label: "part_001".to_string(),
                rows: rows.len(),
                bytes: 0,
                fit: None,
                window: None,
            },
            rows,
        }
    }

    fn contacts(n: usize) -> DataSet {
        let schema = Schema::new(vec![
            Field::new("Id", DataType::Int64),
            Field::new("Nome", DataType::Utf8),
        ]);
        let rows = (0..n)
            .map(|i| vec![Value::Int64(i as i64), Value::Utf8(format!("Contact {i:04}"))])
            .collect();
        DataSet::new(schema, rows)
    }

    fn chunk(label: &str, rows: std::ops::Range<usize>) -> Chunk {
        Chunk {
            label: label.to_string(),
            window: None,
            rows: rows.collect(),
            size_bytes: None,
            fit: ChunkFit::Within,
        }
    }

    fn labels(chunks: &[WrittenChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.artifact.label.as_str()).collect()
    }

    #[test]
    fn completeness_requires_every_row_once() {
        check_completeness(4, &[written(vec![0, 1]), written(vec![3])], &[2]).unwrap();
        assert!(check_completeness(4, &[written(vec![0, 1])], &[2]).is_err());
        let err = check_completeness(2, &[written(vec![0, 1]), written(vec![1])], &[]).unwrap_err();
        assert!(err.to_string().contains("1 rows repeated"));
    }

    #[test]
    fn conform_reorders_and_fills_columns() {
        let src = DataSet::new(
            Schema::new(vec![
                Field::new("Nome", DataType::Utf8),
                Field::new("id", DataType::Int64),
            ]),
            vec![vec![Value::Utf8("Ana".into()), Value::Int64(7)]],
        );
        let target = Schema::new(vec![
            Field::new("ID", DataType::Int64),
            Field::new("Nome", DataType::Utf8),
            Field::new("CEP", DataType::Utf8),
        ]);
        let out = conform(src, &target).unwrap();
        assert_eq!(out.rows[0], vec![Value::Int64(7), Value::Utf8("Ana".into()), Value::Null]);
    }

    #[test]
    fn conform_rejects_ragged_rows() {
        let mut src = contacts(3);
        src.rows[1].pop();
        let target = src.schema.clone();
        match conform(src, &target) {
            Err(ExportError::SchemaMismatch { message }) => assert!(message.contains("row 2 has 1 values")),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn part_groups_ignore_part_suffixes() {
        assert_eq!(part_group("part_001"), None);
        assert_eq!(part_group("part_001_part_002"), None);
        assert_eq!(part_group("2021-03"), Some("2021-03"));
        assert_eq!(part_group("2021-03_part_002_part_001"), Some("2021-03"));
        assert_eq!(part_group("no_date_part_001"), Some("no_date"));
        assert_eq!(part_group("2021-03-01_to_2021-03-07_part_001"), Some("2021-03-01_to_2021-03-07"));
    }

    #[test]
    fn sweep_halves_a_chunk_that_grew_on_disk_and_renumbers_flat() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::default().with_ceiling(200).with_output_dir(dir.path());
        let orchestrator = Orchestrator::new(&config);
        let ctx = PipelineContext {
            dataset: "contacts".to_string(),
        };
        let data = contacts(4);
        let estimator = SizeEstimator::new(ArtifactFormat::Csv, &config.date_format);
        let splitter = RowSplitter::from_config(&estimator, &config);
        let sink = ArtifactSink::new(dir.path(), "contacts", ArtifactFormat::Csv).unwrap();

        let first = orchestrator.write_chunk(&ctx, &sink, &estimator, &data, chunk("part_001", 0..2)).unwrap();
        let second = orchestrator.write_chunk(&ctx, &sink, &estimator, &data, chunk("part_002", 2..4)).unwrap();
        // The estimate says the chunk fits; only the file on disk is too large.
        let mut file = OpenOptions::new().append(true).open(&first.artifact.path).unwrap();
        file.write_all(&[b'#'; 500]).unwrap();
        drop(file);

        let (done, replaced) = orchestrator
            .sweep(&ctx, &sink, &estimator, &splitter, &data, vec![first, second])
            .unwrap();

        assert_eq!(replaced, 1);
        assert_eq!(labels(&done), vec!["part_001", "part_002", "part_003"]);
        let rows: Vec<Vec<usize>> = done.iter().map(|c| c.rows.clone()).collect();
        assert_eq!(rows, vec![vec![0], vec![1], vec![2, 3]]);
        check_completeness(4, &done, &[]).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["contacts_part_001.csv", "contacts_part_002.csv", "contacts_part_003.csv"]);
        for c in &done {
            assert_eq!(c.artifact.path, sink.path_for(&c.artifact.label));
            let body = fs::read_to_string(&c.artifact.path).unwrap();
            assert!(!body.contains('#'));
            assert_eq!(body.lines().count(), c.rows.len() + 1);
        }
    }

    #[test]
    fn sweep_resplits_an_unmeasured_bucket_within_its_window() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::default().with_ceiling(200).with_output_dir(dir.path());
        let orchestrator = Orchestrator::new(&config);
        let ctx = PipelineContext {
            dataset: "contacts".to_string(),
        };
        let data = contacts(40);
        let estimator = SizeEstimator::new(ArtifactFormat::Csv, &config.date_format);
        let splitter = RowSplitter::from_config(&estimator, &config);
        let sink = ArtifactSink::new(dir.path(), "contacts", ArtifactFormat::Csv).unwrap();

        let mut oversized = chunk("2021-03_part_002", 1..40);
        oversized.fit = ChunkFit::Unmeasured;
        let first = orchestrator.write_chunk(&ctx, &sink, &estimator, &data, chunk("2021-03_part_001", 0..1)).unwrap();
        let second = orchestrator.write_chunk(&ctx, &sink, &estimator, &data, oversized).unwrap();
        assert!(second.artifact.bytes > 200);

        let (done, replaced) = orchestrator
            .sweep(&ctx, &sink, &estimator, &splitter, &data, vec![first, second])
            .unwrap();

        assert_eq!(replaced, 1);
        assert!(done.len() >= 3);
        for (i, c) in done.iter().enumerate() {
            assert_eq!(c.artifact.label, part_label(Some("2021-03"), i, done.len()));
            assert!(c.artifact.bytes <= 200, "{} is {} bytes", c.artifact.label, c.artifact.bytes);
            assert_eq!(fs::metadata(&c.artifact.path).unwrap().len(), c.artifact.bytes);
        }
        let rows: Vec<usize> = done.iter().flat_map(|c| c.rows.iter().copied()).collect();
        assert_eq!(rows, (0..40).collect::<Vec<_>>());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), done.len());
    }
}
