//! Date-bucket planning over a granularity cascade.

use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use tracing::debug;

use crate::config::{DateBounds, ExportConfig};
use crate::encoding::SizeEstimator;
use crate::error::{ExportError, ExportResult};
use crate::types::{coerce_date, DataSet};

use super::granularity::{Bucketer, Granularity};
use super::rows::RowSplitter;
use super::{Chunk, ChunkFit};

/// Label of the bucket holding rows with a null or unparseable date.
pub const NO_DATE_LABEL: &str = "no_date";

/// Outcome of one granularity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranularityAttempt {
    /// Granularity tried.
    pub granularity: Granularity,
    /// Number of buckets at this level, the no-date bucket included.
    pub buckets: usize,
    /// Buckets above the ceiling or unmeasurable.
    pub oversized: usize,
}

/// Result of [`DateBucketPlanner::plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatePlan {
    /// Selected granularity; [`Granularity::RowCount`] when no row carried a usable date.
    pub granularity: Granularity,
    /// Buckets in window order, the no-date bucket (or its parts) last.
    pub buckets: Vec<Chunk>,
    /// Rows whose date falls outside the configured bounds. They belong to no bucket.
    pub diverted: Vec<usize>,
    /// Levels tried, coarsest first.
    pub attempts: Vec<GranularityAttempt>,
}

/// Buckets a dataset by a date column at the coarsest granularity whose buckets all fit.
///
/// Levels are tried in cascade order. The first level where every bucket (the no-date bucket
/// included) measures at or below the ceiling is selected. When even the finest level leaves
/// oversized buckets, those buckets alone are handed to the [`RowSplitter`] and their parts keep
/// the bucket's label as a prefix.
#[derive(Debug, Clone)]
pub struct DateBucketPlanner<'a> {
    estimator: &'a SizeEstimator,
    splitter: RowSplitter<'a>,
    cascade: &'a [Granularity],
    bounds: DateBounds,
    processing_date: NaiveDate,
    date_format: &'a str,
}

impl<'a> DateBucketPlanner<'a> {
    /// Planner using the ceiling, cascade, bounds and processing date from `config`.
    pub fn from_config(estimator: &'a SizeEstimator, config: &'a ExportConfig) -> Self {
        Self {
            estimator,
            splitter: RowSplitter::from_config(estimator, config),
            cascade: &config.granularities,
            bounds: config.date_bounds,
            processing_date: config.processing_date(),
            date_format: &config.date_format,
        }
    }

    /// Inclusive `(earliest, latest)` range of dates kept for bucketing.
    pub fn sane_range(&self) -> (NaiveDate, NaiveDate) {
        let past = Months::new(self.bounds.max_years_past.saturating_mul(12));
        let future = Months::new(self.bounds.max_years_future.saturating_mul(12));
        (
            self.processing_date
                .checked_sub_months(past)
                .unwrap_or(NaiveDate::MIN),
            self.processing_date
                .checked_add_months(future)
                .unwrap_or(NaiveDate::MAX),
        )
    }

    /// Partition `dataset` by `column`.
    ///
    /// Fails only when `column` is not part of the schema.
    pub fn plan(&self, dataset: &DataSet, column: &str) -> ExportResult<DatePlan> {
        let col = dataset
            .schema
            .index_of(column)
            .ok_or_else(|| ExportError::SchemaMismatch {
                message: format!("date column '{column}' not in schema"),
            })?;

        let (earliest, latest) = self.sane_range();
        let mut dated: Vec<(usize, NaiveDate)> = Vec::new();
        let mut undated: Vec<usize> = Vec::new();
        let mut diverted: Vec<usize> = Vec::new();
        for (i, row) in dataset.rows.iter().enumerate() {
            match row.get(col).and_then(|v| coerce_date(v, self.date_format)) {
                None => undated.push(i),
                Some(d) if d < earliest || d > latest => diverted.push(i),
                Some(d) => dated.push((i, d)),
            }
        }
        if !diverted.is_empty() {
            debug!(column, rows = diverted.len(), %earliest, %latest, "rows diverted for out-of-range dates");
        }

        let levels: Vec<(Granularity, Bucketer)> = match dated.iter().map(|(_, d)| *d).min() {
            Some(min_date) => self
                .cascade
                .iter()
                .filter_map(|g| g.bucketer(min_date).map(|b| (*g, b)))
                .collect(),
            None => Vec::new(),
        };
        let Some(((finest, finest_bucketer), coarser)) = levels.split_last() else {
            let mut kept: Vec<usize> = dated.iter().map(|(i, _)| *i).chain(undated).collect();
            kept.sort_unstable();
            debug!(column, rows = kept.len(), "no usable dates; splitting by row count");
            return Ok(DatePlan {
                granularity: Granularity::RowCount,
                buckets: self.splitter.split(dataset, &kept),
                diverted,
                attempts: Vec::new(),
            });
        };

        let no_date = (!undated.is_empty()).then(|| self.measure(dataset, NO_DATE_LABEL, undated));
        let mut attempts = Vec::with_capacity(levels.len());

        for (granularity, bucketer) in coarser {
            let (buckets, attempt) =
                self.bucket_level(dataset, &dated, no_date.as_ref(), *granularity, bucketer);
            let all_fit = attempt.oversized == 0;
            attempts.push(attempt);
            if all_fit {
                return Ok(DatePlan {
                    granularity: *granularity,
                    buckets,
                    diverted,
                    attempts,
                });
            }
        }

        let (buckets, attempt) =
            self.bucket_level(dataset, &dated, no_date.as_ref(), *finest, finest_bucketer);
        attempts.push(attempt);
        let ceiling = self.splitter.ceiling();
        let buckets = buckets
            .into_iter()
            .flat_map(|bucket| {
                if bucket.fits(ceiling) {
                    vec![bucket]
                } else {
                    self.splitter.split_labeled(
                        dataset,
                        &bucket.rows,
                        Some(&bucket.label),
                        bucket.window,
                    )
                }
            })
            .collect();
        Ok(DatePlan {
            granularity: *finest,
            buckets,
            diverted,
            attempts,
        })
    }

    fn bucket_level(
        &self,
        dataset: &DataSet,
        dated: &[(usize, NaiveDate)],
        no_date: Option<&Chunk>,
        granularity: Granularity,
        bucketer: &Bucketer,
    ) -> (Vec<Chunk>, GranularityAttempt) {
        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for &(i, d) in dated {
            groups.entry(bucketer.key(d)).or_default().push(i);
        }

        let mut buckets: Vec<Chunk> = groups
            .into_iter()
            .map(|(key, rows)| {
                let window = bucketer.window(key);
                let mut chunk = self.measure(dataset, &bucketer.label(&window), rows);
                chunk.window = Some(window);
                chunk
            })
            .collect();
        buckets.extend(no_date.cloned());

        let ceiling = self.splitter.ceiling();
        let oversized = buckets.iter().filter(|c| !c.fits(ceiling)).count();
        debug!(
            granularity = %granularity.name(),
            buckets = buckets.len(),
            oversized,
            "granularity attempted"
        );
        let attempt = GranularityAttempt {
            granularity,
            buckets: buckets.len(),
            oversized,
        };
        (buckets, attempt)
    }

    fn measure(&self, dataset: &DataSet, label: &str, rows: Vec<usize>) -> Chunk {
        let size_bytes = self.estimator.estimate(dataset, &rows).ok();
        let fit = match size_bytes {
            Some(size) if size <= self.splitter.ceiling() => ChunkFit::Within,
            Some(_) => ChunkFit::OversizedLeaf,
            None => ChunkFit::Unmeasured,
        };
        Chunk {
            label: label.to_string(),
            window: None,
            rows,
            size_bytes,
            fit,
        }
    }
}
