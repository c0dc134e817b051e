//! `bounded-export` turns tabular datasets into CSV (or XLSX) artifacts that each stay under a
//! configurable byte ceiling.
//!
//! For every dataset type the [`pipeline::Orchestrator`] loads the input against a declared
//! [`catalog::DatasetProfile`], reports data quality anomalies, imputes missing values, writes the
//! complete artifact and, when that artifact is above the ceiling, partitions the rows:
//!
//! - by date buckets when the profile names a partition date column, trying
//!   `5-year → year → month → week → day` windows and keeping the coarsest granularity whose
//!   buckets all fit
//! - by row count otherwise, sizing chunks from the measured average row size and bisecting any
//!   chunk that still exceeds the ceiling
//!
//! Sizes are measured by encoding rows exactly as they are written, and every written chunk is
//! re-measured on disk before the dataset is considered done.
//!
//! ## Quick example: export one dataset
//!
//! ```no_run
//! use bounded_export::catalog::Catalog;
//! use bounded_export::config::ExportConfig;
//! use bounded_export::pipeline::{DatasetSource, Orchestrator};
//!
//! # fn main() -> Result<(), bounded_export::ExportError> {
//! let config = ExportConfig::default().with_output_dir("exported_data_split");
//! let catalog = Catalog::builtin();
//! let profile = catalog.get("accounts_receivable").expect("built-in profile");
//!
//! let report = Orchestrator::new(&config).run(
//!     profile,
//!     DatasetSource::Path("exported_data/contas_a_receber.csv".into()),
//! )?;
//! for artifact in &report.artifacts {
//!     println!("{} rows={} bytes={}", artifact.path.display(), artifact.rows, artifact.bytes);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch example: every dataset in a directory
//!
//! ```no_run
//! use bounded_export::catalog::Catalog;
//! use bounded_export::config::ExportConfig;
//! use bounded_export::execution::{discover_jobs, BatchRunner};
//! use bounded_export::pipeline::verify;
//!
//! # fn main() -> Result<(), bounded_export::ExportError> {
//! let config = ExportConfig::from_json_path("export.json")?;
//! let catalog = Catalog::builtin();
//! let jobs = discover_jobs("exported_data", &catalog)?;
//!
//! let summary = BatchRunner::new(1)?.run(&config, jobs);
//! summary.write_manifest(&config.output_dir)?;
//! for (dataset, err) in summary.failures() {
//!     eprintln!("{dataset}: {err}");
//! }
//! for report in summary.reports().filter(|r| r.skipped.is_none()) {
//!     let profile = catalog.get(&report.dataset).expect("catalog profile");
//!     assert!(verify(&config, profile)?.is_ok());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: export configuration (ceiling, safety margin, date handling, granularities)
//! - [`catalog`]: declared schemas, fill policies and quality checks per dataset type
//! - [`ingestion`]: CSV and workbook loading against a schema
//! - [`quality`]: anomaly scanning and imputation
//! - [`encoding`]: artifact encoders and size measurement
//! - [`partition`]: row-count and date-bucket partitioning
//! - [`pipeline`]: per-dataset orchestration, artifact persistence and split verification
//! - [`execution`]: input discovery and batch runs across dataset types
//! - [`observability`]: pipeline observers
//! - [`processing`]: column reductions
//! - [`types`]: schema and in-memory dataset types
//! - [`error`]: error types

pub mod catalog;
pub mod config;
pub mod encoding;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod observability;
pub mod partition;
pub mod pipeline;
pub mod processing;
pub mod quality;
pub mod types;

pub use error::{ExportError, ExportResult, Severity};
