//! Row-count splitting with verify-and-bisect refinement.

use tracing::{debug, warn};

use crate::config::ExportConfig;
use crate::encoding::SizeEstimator;
use crate::types::DataSet;

use super::{part_label, Chunk, ChunkFit, DateWindow};

/// Splits a row sequence into contiguous chunks that each encode at or below a byte ceiling.
///
/// Chunk sizing starts from the average encoded bytes per row of the whole sequence, targeting
/// `ceiling * safety_margin` bytes per chunk. Every chunk is then measured; a chunk still above the
/// ceiling is bisected at its midpoint and both halves are refined independently. A single row
/// above the ceiling cannot be split further and is accepted as [`ChunkFit::OversizedLeaf`].
#[derive(Debug, Clone)]
pub struct RowSplitter<'a> {
    estimator: &'a SizeEstimator,
    ceiling: u64,
    safety_margin: f64,
    fallback_bytes_per_row: f64,
}

impl<'a> RowSplitter<'a> {
    /// Create a splitter with the default safety margin (0.95).
    pub fn new(estimator: &'a SizeEstimator, ceiling: u64) -> Self {
        Self {
            estimator,
            ceiling,
            safety_margin: 0.95,
            fallback_bytes_per_row: 500.0,
        }
    }

    /// Splitter using the ceiling, margin and fallback figure from `config`.
    pub fn from_config(estimator: &'a SizeEstimator, config: &ExportConfig) -> Self {
        Self {
            estimator,
            ceiling: config.ceiling_bytes,
            safety_margin: config.safety_margin,
            fallback_bytes_per_row: config.fallback_bytes_per_row,
        }
    }

    /// The byte ceiling.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// `floor(ceiling * safety_margin / bytes_per_row)`, clamped to `[1, total_rows]`.
    pub fn target_rows_per_chunk(&self, bytes_per_row: f64, total_rows: usize) -> usize {
        if total_rows == 0 {
            return 0;
        }
        let bytes_per_row = if bytes_per_row > 0.0 {
            bytes_per_row
        } else {
            self.fallback_bytes_per_row
        };
        let target = (self.ceiling as f64 * self.safety_margin / bytes_per_row).floor();
        (target as usize).clamp(1, total_rows)
    }

    /// Split the rows at `indices` into chunks labelled `part_001`, `part_002`, ...
    pub fn split(&self, dataset: &DataSet, indices: &[usize]) -> Vec<Chunk> {
        self.split_labeled(dataset, indices, None, None)
    }

    /// Split the rows at `indices`; labels are `<base>_part_NNN` when `base` is given and every
    /// chunk inherits `window`.
    pub fn split_labeled(
        &self,
        dataset: &DataSet,
        indices: &[usize],
        base: Option<&str>,
        window: Option<DateWindow>,
    ) -> Vec<Chunk> {
        if indices.is_empty() {
            return Vec::new();
        }

        let bytes_per_row = match self.estimator.estimate(dataset, indices) {
            Ok(total) => total as f64 / indices.len() as f64,
            Err(err) => {
                warn!(error = %err, rows = indices.len(), "cannot measure row sequence; using fallback bytes per row");
                self.fallback_bytes_per_row
            }
        };
        let rows_per_chunk = self.target_rows_per_chunk(bytes_per_row, indices.len());
        debug!(
            rows = indices.len(),
            bytes_per_row,
            rows_per_chunk,
            ceiling = self.ceiling,
            "row split planned"
        );

        let mut leaves = Vec::new();
        for slice in indices.chunks(rows_per_chunk) {
            self.refine(dataset, slice, false, &mut leaves);
        }

        let total = leaves.len();
        leaves
            .into_iter()
            .enumerate()
            .map(|(i, leaf)| Chunk {
                label: part_label(base, i, total),
                window,
                rows: leaf.rows,
                size_bytes: leaf.size_bytes,
                fit: leaf.fit,
            })
            .collect()
    }

    fn refine(&self, dataset: &DataSet, rows: &[usize], retried: bool, out: &mut Vec<Leaf>) {
        match self.estimator.estimate(dataset, rows) {
            Ok(size) if size <= self.ceiling => out.push(Leaf::new(rows, Some(size), ChunkFit::Within)),
            Ok(size) if rows.len() == 1 => {
                warn!(
                    row = rows[0],
                    size,
                    ceiling = self.ceiling,
                    "single row exceeds ceiling; accepting oversized leaf"
                );
                out.push(Leaf::new(rows, Some(size), ChunkFit::OversizedLeaf));
            }
            Ok(size) => {
                debug!(rows = rows.len(), size, ceiling = self.ceiling, "chunk over ceiling; bisecting");
                let (left, right) = rows.split_at(rows.len() / 2);
                self.refine(dataset, left, retried, out);
                self.refine(dataset, right, retried, out);
            }
            Err(err) if !retried && rows.len() > 1 => {
                warn!(error = %err, rows = rows.len(), "chunk measurement failed; retrying at a finer boundary");
                let (left, right) = rows.split_at(rows.len() / 2);
                self.refine(dataset, left, true, out);
                self.refine(dataset, right, true, out);
            }
            Err(err) => {
                warn!(error = %err, rows = rows.len(), "chunk measurement failed; accepting unmeasured leaf");
                out.push(Leaf::new(rows, None, ChunkFit::Unmeasured));
            }
        }
    }
}

struct Leaf {
    rows: Vec<usize>,
    size_bytes: Option<u64>,
    fit: ChunkFit,
}

impl Leaf {
    fn new(rows: &[usize], size_bytes: Option<u64>, fit: ChunkFit) -> Self {
        Self {
            rows: rows.to_vec(),
            size_bytes,
            fit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RowSplitter;
    use crate::encoding::{ArtifactFormat, SizeEstimator};
    use crate::partition::ChunkFit;
    use crate::types::{DataSet, DataType, Field, Schema, Value};

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

    fn estimator() -> SizeEstimator {
        SizeEstimator::new(ArtifactFormat::Csv, "%d/%m/%Y")
    }

    #[test]
    fn target_rows_are_clamped() {
        let est = estimator();
        let splitter = RowSplitter::new(&est, 1_000);
        assert_eq!(splitter.target_rows_per_chunk(10.0, 500), 95);
        assert_eq!(splitter.target_rows_per_chunk(10.0, 20), 20);
        assert_eq!(splitter.target_rows_per_chunk(5_000.0, 20), 1);
        assert_eq!(splitter.target_rows_per_chunk(0.0, 20), 1);
    }

    #[test]
    fn hundred_rows_with_small_ceiling_cover_every_row_once() {
        let ds = contacts(100);
        let est = estimator();
        let splitter = RowSplitter::new(&est, 400);
        let all: Vec<usize> = (0..100).collect();
        let chunks = splitter.split(&ds, &all);

        assert!(chunks.len() >= 3, "got {} chunks", chunks.len());
        let flattened: Vec<usize> = chunks.iter().flat_map(|c| c.rows.iter().copied()).collect();
        assert_eq!(flattened, all);
        for c in &chunks {
            assert_eq!(c.fit, ChunkFit::Within);
            assert!(c.size_bytes.unwrap() <= 400);
        }
        assert_eq!(chunks[0].label, "part_001");
    }

    #[test]
    fn single_oversized_row_becomes_flagged_leaf() {
        let ds = contacts(3);
        let est = estimator();
        let splitter = RowSplitter::new(&est, 10);
        let chunks = splitter.split(&ds, &[0, 1, 2]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.fit == ChunkFit::OversizedLeaf && c.row_count() == 1));
    }

    #[test]
    fn labels_inherit_base_and_window() {
        let ds = contacts(40);
        let est = estimator();
        let splitter = RowSplitter::new(&est, 200);
        let all: Vec<usize> = (0..40).collect();
        let chunks = splitter.split_labeled(&ds, &all, Some("2021-03-05"), None);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.label.starts_with("2021-03-05_part_")));
    }

    #[test]
    fn unmeasurable_rows_are_retried_then_accepted() {
        let ds = contacts(4);
        let est = estimator();
        let splitter = RowSplitter::new(&est, 1_000_000);
        // Index 9 does not exist, so every selection containing it fails to encode.
        let chunks = splitter.split(&ds, &[0, 1, 9]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].rows, vec![0]);
        assert_eq!(chunks[0].fit, ChunkFit::Within);
        // The failing half is not bisected a second time.
        assert_eq!(chunks[1].rows, vec![1, 9]);
        assert_eq!(chunks[1].fit, ChunkFit::Unmeasured);
        assert_eq!(chunks[1].size_bytes, None);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let ds = contacts(0);
        let est = estimator();
        assert!(RowSplitter::new(&est, 100).split(&ds, &[]).is_empty());
    }
}
