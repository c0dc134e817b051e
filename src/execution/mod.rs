//! Batch execution across dataset types.
//!
//! This module sits "above" [`crate::pipeline`] and provides:
//!
//! - Input discovery: one [`DatasetJob`] per catalog profile
//! - A [`BatchRunner`] that runs independent datasets on a `rayon` pool of caller-chosen size
//!   (one worker runs them one after another), isolating each dataset's failure from the others
//! - Live [`BatchMetrics`] counters

mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::catalog::{Catalog, DatasetProfile};
use crate::config::ExportConfig;
use crate::error::{ExportError, ExportResult};
use crate::observability::PipelineObserver;
use crate::pipeline::{write_manifest, DatasetReport, DatasetSource, Orchestrator, PipelineOptions};

pub use metrics::{BatchMetrics, BatchMetricsSnapshot};

use metrics::DatasetEnd;

/// Input extensions recognised by discovery, most preferred first.
const INPUT_EXTENSIONS: [&str; 2] = ["csv", "xlsx"];

/// One dataset to export.
#[derive(Debug, Clone)]
pub struct DatasetJob {
    pub profile: DatasetProfile,
    pub source: DatasetSource,
}

/// Build one job per profile in `catalog`, in catalog order.
///
/// Each profile's input is `<input_name>.csv` (preferred) or `<input_name>.xlsx` directly inside
/// `input_dir`, matched case-insensitively. A profile without an input file still gets a job; it
/// fails with [`ExportError::MissingInput`] when run, leaving the other datasets unaffected.
pub fn discover_jobs(input_dir: impl AsRef<Path>, catalog: &Catalog) -> ExportResult<Vec<DatasetJob>> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(ExportError::MissingInput {
            path: input_dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input_dir).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let jobs = catalog
        .profiles
        .iter()
        .map(|profile| {
            let path = find_input(&files, &profile.input_name)
                .unwrap_or_else(|| input_dir.join(format!("{}.{}", profile.input_name, INPUT_EXTENSIONS[0])));
            debug!(dataset = %profile.name, path = %path.display(), "input resolved");
            DatasetJob {
                profile: profile.clone(),
                source: DatasetSource::Path(path),
            }
        })
        .collect();
    Ok(jobs)
}

fn find_input(files: &[PathBuf], input_name: &str) -> Option<PathBuf> {
    INPUT_EXTENSIONS.iter().find_map(|wanted| {
        files
            .iter()
            .find(|path| {
                let stem = path.file_stem().and_then(|s| s.to_str());
                let ext = path.extension().and_then(|s| s.to_str());
                matches!((stem, ext), (Some(s), Some(e))
                    if s.eq_ignore_ascii_case(input_name) && e.eq_ignore_ascii_case(wanted))
            })
            .cloned()
    })
}

/// Result of one dataset within a batch.
#[derive(Debug)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub result: ExportResult<DatasetReport>,
}

/// Results of a batch, in job order.
#[derive(Debug)]
pub struct BatchSummary {
    pub outcomes: Vec<DatasetOutcome>,
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Reports of datasets that finished without error (skipped ones included).
    pub fn reports(&self) -> impl Iterator<Item = &DatasetReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Datasets whose pipeline failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExportError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.dataset.as_str(), e)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Write `manifest.json` with every successful report into `dir`.
    pub fn write_manifest(&self, dir: impl AsRef<Path>) -> ExportResult<PathBuf> {
        let reports: Vec<DatasetReport> = self.reports().cloned().collect();
        write_manifest(dir, &reports)
    }
}

/// Runs dataset jobs on a dedicated thread pool.
pub struct BatchRunner {
    pool: ThreadPool,
    options: PipelineOptions,
    metrics: Arc<BatchMetrics>,
}

impl BatchRunner {
    /// Runner with `num_threads` workers; `0` is rejected.
    pub fn new(num_threads: usize) -> ExportResult<Self> {
        if num_threads == 0 {
            return Err(ExportError::InvalidConfig {
                message: "num_threads must be > 0".to_string(),
            });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("bounded-export-{i}"))
            .build()
            .map_err(|e| ExportError::InvalidConfig {
                message: format!("failed to build thread pool: {e}"),
            })?;
        Ok(Self {
            pool,
            options: PipelineOptions::default(),
            metrics: Arc::new(BatchMetrics::new()),
        })
    }

    /// Replace the options passed to every dataset pipeline.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach an observer shared by every dataset pipeline.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.options.observer = Some(observer);
        self
    }

    /// Handle to live batch metrics.
    pub fn metrics(&self) -> Arc<BatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run every job; a failing dataset does not stop the others.
    pub fn run(&self, config: &ExportConfig, jobs: Vec<DatasetJob>) -> BatchSummary {
        let start = Instant::now();
        self.metrics.begin_run();
        let orchestrator = Orchestrator::new(config).with_options(self.options.clone());

        let outcomes: Vec<DatasetOutcome> = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    self.metrics.on_dataset_start();
                    let result = orchestrator.run(&job.profile, job.source);
                    self.metrics.on_dataset_end(match &result {
                        Ok(report) if report.skipped.is_some() => DatasetEnd::Skipped,
                        Ok(report) => DatasetEnd::Succeeded {
                            artifacts: report.artifacts.len() as u64,
                            bytes: report.artifacts.iter().map(|a| a.bytes).sum(),
                        },
                        Err(_) => DatasetEnd::Failed,
                    });
                    DatasetOutcome {
                        dataset: job.profile.name,
                        result,
                    }
                })
                .collect()
        });

        let elapsed = start.elapsed();
        self.metrics.end_run(elapsed);
        let snapshot = self.metrics.snapshot();
        info!(
            datasets = outcomes.len(),
            succeeded = snapshot.datasets_succeeded,
            skipped = snapshot.datasets_skipped,
            failed = snapshot.datasets_failed,
            artifacts = snapshot.artifacts_written,
            ?elapsed,
            "batch finished"
        );
        BatchSummary { outcomes, elapsed }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{discover_jobs, BatchRunner};
    use crate::catalog::Catalog;
    use crate::error::ExportError;
    use crate::pipeline::DatasetSource;

    #[test]
    fn discovery_prefers_csv_and_keeps_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("contatos.xlsx"), b"").unwrap();
        fs::write(dir.path().join("Contatos.csv"), b"ID\n").unwrap();
        fs::write(dir.path().join("contas_a_pagar.xlsx"), b"").unwrap();

        let jobs = discover_jobs(dir.path(), &Catalog::builtin()).unwrap();
        assert_eq!(jobs.len(), 3);
        let path_of = |name: &str| match &jobs.iter().find(|j| j.profile.name == name).unwrap().source {
            DatasetSource::Path(p) => p.file_name().unwrap().to_string_lossy().to_string(),
            DatasetSource::InMemory(_) => unreachable!(),
        };
        assert_eq!(path_of("contacts"), "Contatos.csv");
        assert_eq!(path_of("accounts_payable"), "contas_a_pagar.xlsx");
        assert_eq!(path_of("accounts_receivable"), "contas_a_receber.csv");
    }

    #[test]
    fn missing_input_directory_is_reported() {
        let err = discover_jobs("/definitely/not/here", &Catalog::builtin()).unwrap_err();
        assert!(matches!(err, ExportError::MissingInput { .. }));
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(BatchRunner::new(0), Err(ExportError::InvalidConfig { .. })));
    }
}
