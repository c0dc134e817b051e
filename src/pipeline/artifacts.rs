//! Artifact naming and atomic persistence.
//!
//! Every artifact is written to a temporary file in the output directory and then renamed over its
//! final name, so a reader never observes a partially written artifact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::encoding::ArtifactFormat;
use crate::error::{ExportError, ExportResult};
use crate::partition::{ChunkFit, DateWindow, NO_DATE_LABEL};

/// Role of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The whole imputed dataset.
    Complete,
    /// One partition of the dataset.
    Chunk,
    /// Rows flagged by one quality check.
    Anomaly,
}

/// A persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    /// Role of the artifact.
    pub kind: ArtifactKind,
    /// Location on disk.
    pub path: PathBuf,
    /// Label the file name was derived from.
    pub label: String,
    /// Data rows, header excluded.
    pub rows: usize,
    /// Realized size on disk.
    pub bytes: u64,
    /// Relation to the ceiling, for chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<ChunkFit>,
    /// Date window, for date buckets and their parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<DateWindow>,
}

/// Writes the artifacts of one dataset type into an output directory.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    dir: PathBuf,
    dataset: String,
    format: ArtifactFormat,
}

impl ArtifactSink {
    /// Sink for `dataset` artifacts in `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>, dataset: &str, format: ArtifactFormat) -> ExportResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            dataset: dataset.to_string(),
            format,
        })
    }

    /// `<dir>/<dataset>_<label>.<ext>`.
    pub fn path_for(&self, label: &str) -> PathBuf {
        artifact_path(&self.dir, &self.dataset, label, self.format)
    }

    /// Atomically write `bytes` as the artifact named by `label`; returns its path and realized size.
    pub fn write(&self, label: &str, bytes: &[u8]) -> ExportResult<(PathBuf, u64)> {
        let path = self.path_for(label);
        write_atomic(&path, bytes)?;
        let size = fs::metadata(&path)?.len();
        debug!(path = %path.display(), bytes = size, "artifact persisted");
        Ok((path, size))
    }

    /// Delete an artifact written earlier.
    pub fn remove(&self, path: &Path) -> ExportResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    /// Give written artifacts new labels; returns the new paths in `moves` order.
    ///
    /// Every file is first moved to an intermediate name, so a new label may be one another file
    /// in `moves` still holds.
    pub fn relabel(&self, moves: &[(PathBuf, String)]) -> ExportResult<Vec<PathBuf>> {
        let mut staged = Vec::with_capacity(moves.len());
        for (from, _) in moves {
            let tmp = from.with_extension("relabel");
            fs::rename(from, &tmp)?;
            staged.push(tmp);
        }
        let mut renamed = Vec::with_capacity(moves.len());
        for (tmp, (_, label)) in staged.iter().zip(moves) {
            let to = self.path_for(label);
            fs::rename(tmp, &to)?;
            renamed.push(to);
        }
        debug!(dataset = %self.dataset, renamed = renamed.len(), "artifacts relabelled");
        Ok(renamed)
    }

    /// Delete every artifact of this dataset type left from a previous run.
    pub fn clear_previous(&self) -> ExportResult<usize> {
        let mut removed = 0;
        for path in existing_artifacts(&self.dir, &self.dataset, self.format)? {
            fs::remove_file(&path)?;
            removed += 1;
        }
        if removed > 0 {
            debug!(dataset = %self.dataset, removed, "previous artifacts removed");
        }
        Ok(removed)
    }
}

/// Artifact path for a dataset type and label.
pub fn artifact_path(dir: &Path, dataset: &str, label: &str, format: ArtifactFormat) -> PathBuf {
    dir.join(format!("{dataset}_{}.{}", sanitize_label(label), format.extension()))
}

/// Existing artifacts of `dataset` in `dir`, sorted by path.
///
/// Files of other dataset types sharing the name prefix are not matched; see [`artifact_label`].
pub fn existing_artifacts(dir: &Path, dataset: &str, format: ArtifactFormat) -> ExportResult<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}_*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(dataset),
        format.extension()
    );
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) if artifact_label(&path, dataset, format).is_some() => paths.push(path),
            Ok(_) => {}
            Err(err) => return Err(ExportError::Io(err.into_error())),
        }
    }
    paths.sort();
    Ok(paths)
}

/// Label of `path` when it is an artifact of `dataset` in `format`.
pub fn artifact_label(path: &Path, dataset: &str, format: ArtifactFormat) -> Option<String> {
    if path.extension()?.to_str()? != format.extension() {
        return None;
    }
    let label = path.file_stem()?.to_str()?.strip_prefix(dataset)?.strip_prefix('_')?;
    is_artifact_label(label).then(|| label.to_string())
}

/// Whether `label` has a shape the pipeline writes: `complete`, `anomaly_*`, `part_NNN`, or a
/// date or `no_date` bucket label, each optionally followed by `_part_NNN` suffixes.
pub fn is_artifact_label(label: &str) -> bool {
    if label == "complete" || label.starts_with("anomaly_") {
        return true;
    }
    let mut base = label;
    while let Some((head, number)) = base.rsplit_once("_part_") {
        if !is_part_number(number) {
            return false;
        }
        base = head;
    }
    base == NO_DATE_LABEL || is_date_label(base) || base.strip_prefix("part_").is_some_and(is_part_number)
}

fn is_part_number(s: &str) -> bool {
    s.len() >= 3 && s.bytes().all(|b| b.is_ascii_digit())
}

/// `2021`, `2020-2024`, `2021-03`, `2021-03-05` or `2021-03-01_to_2021-03-07`.
fn is_date_label(label: &str) -> bool {
    let date_like = |s: &str| {
        s.starts_with(|c: char| c.is_ascii_digit()) && s.chars().all(|c| c.is_ascii_digit() || c == '-')
    };
    match label.split_once("_to_") {
        Some((start, end)) => date_like(start) && date_like(end),
        None => date_like(label),
    }
}

/// Write `bytes` to `path` through a same-directory temporary file and an atomic rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ExportResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| ExportError::Io(e.error))?;
    Ok(())
}

/// File-name-safe label: runs of whitespace and path or drive separators become one `_`.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        let unsafe_char = c.is_whitespace() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        if unsafe_char {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    out.trim_matches('_').to_string()
}
