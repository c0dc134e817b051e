//! Explicit export configuration.
//!
//! Every pipeline call receives an [`ExportConfig`]; nothing in the crate reads process-wide
//! settings. Configurations can be built in code (starting from [`Default`]) or loaded from JSON:
//!
//! ```no_run
//! use bounded_export::config::ExportConfig;
//!
//! # fn main() -> Result<(), bounded_export::ExportError> {
//! let config = ExportConfig::from_json_path("export.json")?;
//! println!("ceiling={} bytes", config.ceiling_bytes);
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::encoding::ArtifactFormat;
use crate::error::{ExportError, ExportResult};
use crate::partition::granularity::{default_cascade, Granularity};

/// Default artifact ceiling: 2,000 KiB.
pub const DEFAULT_CEILING_BYTES: u64 = 2_000 * 1024;

/// Bounds outside of which a date is treated as anomalous, relative to the processing date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateBounds {
    /// Dates more than this many years after the processing date are anomalous.
    pub max_years_future: u32,
    /// Dates more than this many years before the processing date are anomalous.
    pub max_years_past: u32,
}

impl Default for DateBounds {
    fn default() -> Self {
        Self {
            max_years_future: 10,
            max_years_past: 50,
        }
    }
}

/// Configuration for one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Maximum byte size of one artifact.
    pub ceiling_bytes: u64,
    /// Fraction of the ceiling targeted when sizing row chunks, in `[0.9, 0.95]`.
    pub safety_margin: f64,
    /// Bytes-per-row figure used when a row sequence cannot be measured.
    pub fallback_bytes_per_row: f64,
    /// Directory receiving every artifact.
    pub output_dir: PathBuf,
    /// Artifact encoding.
    pub format: ArtifactFormat,
    /// `chrono` format used to write (and preferentially parse) dates. Day-first by default.
    pub date_format: String,
    /// Anomalous-date bounds.
    pub date_bounds: DateBounds,
    /// Granularity cascade tried by the date planner, coarsest first.
    pub granularities: Vec<Granularity>,
    /// Date used for date imputation and anomaly bounds. `None` means today.
    pub processing_date: Option<NaiveDate>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: DEFAULT_CEILING_BYTES,
            safety_margin: 0.95,
            fallback_bytes_per_row: 500.0,
            output_dir: PathBuf::from("exported_data_split"),
            format: ArtifactFormat::Csv,
            date_format: "%d/%m/%Y".to_string(),
            date_bounds: DateBounds::default(),
            granularities: default_cascade(),
            processing_date: None,
        }
    }
}

impl ExportConfig {
    /// Load and validate a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_path(path: impl AsRef<Path>) -> ExportResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style ceiling override.
    pub fn with_ceiling(mut self, ceiling_bytes: u64) -> Self {
        self.ceiling_bytes = ceiling_bytes;
        self
    }

    /// Builder-style output directory override.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder-style processing date override.
    pub fn with_processing_date(mut self, date: NaiveDate) -> Self {
        self.processing_date = Some(date);
        self
    }

    /// The processing date: the configured one, or today's local date.
    pub fn processing_date(&self) -> NaiveDate {
        self.processing_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> ExportResult<()> {
        if self.ceiling_bytes == 0 {
            return Err(invalid("ceiling_bytes must be > 0"));
        }
        if !(0.9..=0.95).contains(&self.safety_margin) {
            return Err(invalid(format!(
                "safety_margin must be within [0.9, 0.95], got {}",
                self.safety_margin
            )));
        }
        if !(self.fallback_bytes_per_row > 0.0) {
            return Err(invalid("fallback_bytes_per_row must be > 0"));
        }
        if self.date_format.trim().is_empty() {
            return Err(invalid("date_format must not be empty"));
        }
        if self.granularities.is_empty() {
            return Err(invalid("granularities must name at least one granularity"));
        }
        let last = self.granularities.len() - 1;
        for (i, g) in self.granularities.iter().enumerate() {
            match g {
                Granularity::YearWindow { years: 0 } => {
                    return Err(invalid("year windows must span at least one year"));
                }
                Granularity::RowCount if i != last => {
                    return Err(invalid("row_count may only appear last in granularities"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ExportError {
    ExportError::InvalidConfig {
        message: message.into(),
    }
}
