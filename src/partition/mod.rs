//! Size-bounded partitioning.
//!
//! - [`rows::RowSplitter`]: contiguous row chunks sized from an average bytes-per-row figure, with
//!   recursive bisection of any chunk still above the ceiling
//! - [`dates::DateBucketPlanner`]: walks a [`granularity::Granularity`] cascade from coarsest to
//!   finest, bucketing rows by a date column, and hands buckets still oversized at the finest level
//!   to the row splitter
//!
//! Both produce [`Chunk`]s: disjoint sets of row indices into the source dataset, each carrying
//! the measured size of its encoding.

pub mod dates;
pub mod granularity;
pub mod rows;

use chrono::NaiveDate;
use serde::Serialize;

pub use dates::{DateBucketPlanner, DatePlan, GranularityAttempt, NO_DATE_LABEL};
pub use granularity::{CalendarUnit, Granularity};
pub use rows::RowSplitter;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DateWindow {
    /// First date inside the window.
    pub start: NaiveDate,
    /// First date after the window.
    pub end: NaiveDate,
}

impl DateWindow {
    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// How a chunk relates to the byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFit {
    /// Measured at or below the ceiling.
    Within,
    /// A single row whose encoding alone exceeds the ceiling; accepted as a leaf.
    OversizedLeaf,
    /// Measurement failed even after one retry; accepted as a leaf with unknown size.
    Unmeasured,
}

/// One output partition of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Human-readable label, used in the artifact file name.
    pub label: String,
    /// Date window for date buckets; `None` for row parts and the no-date bucket.
    pub window: Option<DateWindow>,
    /// Indices of the chunk's rows in the source dataset, in dataset order.
    pub rows: Vec<usize>,
    /// Measured encoded size, when measurement succeeded.
    pub size_bytes: Option<u64>,
    /// Relation to the ceiling.
    pub fit: ChunkFit,
}

impl Chunk {
    /// Number of rows in the chunk.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the chunk was measured at or below `ceiling`.
    pub fn fits(&self, ceiling: u64) -> bool {
        matches!(self.size_bytes, Some(size) if size <= ceiling)
    }
}

/// Zero-padded, 1-based part label such as `part_001`, optionally prefixed with `base`.
///
/// Padding is at least three digits and grows with `total` so labels sort lexicographically.
pub fn part_label(base: Option<&str>, index: usize, total: usize) -> String {
    let width = total.to_string().len().max(3);
    match base {
        Some(base) => format!("{base}_part_{:0width$}", index + 1),
        None => format!("part_{:0width$}", index + 1),
    }
}
